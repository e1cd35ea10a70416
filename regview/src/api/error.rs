use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("regview returned failure")]
    Regview(#[from] crate::error::Error),
    #[error("cannot build register model")]
    Model(#[from] crate::error::ModelError),
    #[error("no peripheral named {0:?} in input")]
    UnknownPeripheral(String),
    #[error("peripheral {periph} has no register named {reg:?}")]
    UnknownRegister { periph: String, reg: String },
}
