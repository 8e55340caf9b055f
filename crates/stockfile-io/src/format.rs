use std::fmt;

/// Spreadsheet formats the decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkbookFormat {
    Xlsx,
    Xlsm,
    Xlsb,
    Xls,
    Ods,
    Csv,
}

impl WorkbookFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "xlsx" => Some(Self::Xlsx),
            "xlsm" => Some(Self::Xlsm),
            "xlsb" => Some(Self::Xlsb),
            "xls" => Some(Self::Xls),
            "ods" => Some(Self::Ods),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Xlsm => "xlsm",
            Self::Xlsb => "xlsb",
            Self::Xls => "xls",
            Self::Ods => "ods",
            Self::Csv => "csv",
        }
    }

    /// The container a file of this format must be stored in, if any.
    pub fn expected_container(self) -> Option<Container> {
        match self {
            Self::Xlsx | Self::Xlsm | Self::Xlsb | Self::Ods => Some(Container::Zip),
            Self::Xls => Some(Container::Cfb),
            Self::Csv => None,
        }
    }
}

impl fmt::Display for WorkbookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Physical container detected from the leading bytes of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// ZIP / Open Packaging Convention (xlsx, xlsm, xlsb, ods).
    Zip,
    /// OLE Compound File Binary (legacy xls, or an encrypted OOXML wrapper).
    Cfb,
    Unknown,
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const CFB_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

pub fn sniff_container(bytes: &[u8]) -> Container {
    if bytes.starts_with(ZIP_MAGIC) {
        Container::Zip
    } else if bytes.starts_with(CFB_MAGIC) {
        Container::Cfb
    } else {
        Container::Unknown
    }
}
