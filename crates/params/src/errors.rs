use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("reading params file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parsing params: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("authorizer {0} has no members")]
    EmptyAuthorizer(&'static str),

    #[error("authorizer {0} lists a member twice")]
    DuplicateAuthorizerMember(&'static str),

    #[error("invalid params: {0}")]
    Invalid(&'static str),
}
