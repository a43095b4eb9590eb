use thiserror::Error;

/// Errors raised while loading a host scene dump.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
}

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("Error serializing or deserializing json: {err}")]
    SerdeJson {
        #[from]
        err: serde_json::Error,
    },
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Scene dump is missing material {id}")]
    MissingMaterial { id: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(x: std::io::Error) -> Error {
        Error { kind: x.into() }
    }
}

impl std::convert::From<serde_json::Error> for Error {
    fn from(x: serde_json::Error) -> Error {
        Error { kind: x.into() }
    }
}

pub type IResult<T> = Result<T, Error>;

pub fn failure_from_kind(kind: ErrorKind) -> Error {
    Error { kind }
}
