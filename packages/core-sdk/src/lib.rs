pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod server;
pub mod storage;
pub mod telemetry;
pub mod video;

/**
 * \brief SDK 预导入集合，方便外部引用常用模块。
 */
pub mod prelude {
    pub use crate::chat;
    pub use crate::config;
    pub use crate::error;
    pub use crate::llm;
    pub use crate::models;
    pub use crate::server;
    pub use crate::storage;
    pub use crate::telemetry;
    pub use crate::video;
}
