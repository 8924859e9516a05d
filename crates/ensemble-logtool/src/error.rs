use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required key component or a cluster-file setting could not be resolved.
    Config,
    /// The archiver/extractor subprocess failed or could not be spawned.
    Process,
    /// A put/get against the blob store failed or returned a damaged blob.
    Store,
    /// The requested key does not exist in the store.
    NotFound,
    /// The results feed could not be read or decoded.
    Feed,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Config => "config",
            ErrorKind::Process => "process",
            ErrorKind::Store => "store",
            ErrorKind::NotFound => "not found",
            ErrorKind::Feed => "feed",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
}

impl Error {
    pub fn new<M: Into<String>>(kind: ErrorKind, msg: M) -> Self {
        Self {
            kind,
            msg: msg.into(),
        }
    }

    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Io, msg)
    }

    pub fn config<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Config, msg)
    }

    pub fn process<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Process, msg)
    }

    pub fn store<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Store, msg)
    }

    pub fn not_found<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    pub fn feed<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Feed, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::msg(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::msg(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_keep_their_message() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.to_string(), "gone");
    }

    #[test]
    fn toml_errors_are_config_errors() {
        let err: Error = toml::from_str::<toml::Value>("a = ").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
