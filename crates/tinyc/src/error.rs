#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] crate::lex::Error),

    #[error(transparent)]
    Parse(#[from] crate::parse::Error),

    #[error(transparent)]
    Symbol(#[from] crate::symtab::Error),

    #[error(transparent)]
    Codegen(#[from] crate::codegen::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
