use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("discord api error: {0}")]
    Discord(#[from] serenity::Error),
    #[error("store i/o error: {0}")]
    StoreIo(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    StoreSerde(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
}

impl BotError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
