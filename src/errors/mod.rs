#[derive(Debug)]
pub enum Error {
    FileExists(String),
    BadRid,
    BadScanParm,
    InvalidRecLen(usize),
    NoSpace,
    InvalidSlot,
    BufferExceeded,
    PageNotPinned,
    PagePinned,
    HashNotFound,
    HashAlreadyPresent,
    BadBuffer,
    RelationExists(String),
    RelationNotFound(String),
    AttrNotFound(String, String),
    BadAttrValue(String),
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::FileExists(name) => write!(f, "File {name} already exists."),
            Error::BadRid => write!(f, "Record id references a nonexistent page or slot."),
            Error::BadScanParm => write!(f, "Invalid scan parameters."),
            Error::InvalidRecLen(len) => {
                write!(f, "Record of {len} bytes can never fit on a page.")
            }
            Error::NoSpace => write!(f, "Page cannot fit the record."),
            Error::InvalidSlot => write!(f, "Slot is out of range or deleted."),
            Error::BufferExceeded => write!(f, "All buffer frames are pinned."),
            Error::PageNotPinned => write!(f, "Unpin attempted on a page with pin count 0."),
            Error::PagePinned => write!(f, "Page is still pinned."),
            Error::HashNotFound => write!(f, "Page is not present in the buffer hash table."),
            Error::HashAlreadyPresent => {
                write!(f, "Page is already present in the buffer hash table.")
            }
            Error::BadBuffer => write!(f, "Inconsistent buffer frame encountered."),
            Error::RelationExists(rel) => write!(f, "Relation {rel} already exists."),
            Error::RelationNotFound(rel) => write!(f, "Relation {rel} does not exist."),
            Error::AttrNotFound(rel, attr) => {
                write!(f, "Attribute {rel}.{attr} does not exist.")
            }
            Error::BadAttrValue(value) => write!(f, "Cannot parse attribute value {value:?}."),
            Error::Io(e) => write!(f, "I/O error: {e}."),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}
