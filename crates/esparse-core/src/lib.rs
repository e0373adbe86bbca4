//! # esparse-core
//!
//! esparse 核心库, 提供统一错误类型与比特流读取工具.
//!
//! 其余 crate (codec / format) 均依赖本 crate 传播错误.

pub mod bitreader;
pub mod error;

// 重导出常用类型
pub use bitreader::BitReader;
pub use error::{EsError, EsResult};
