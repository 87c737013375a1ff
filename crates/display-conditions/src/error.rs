//! 展示条件引擎错误类型
//!
//! 求值本身从不报错（一律放行），错误只出现在加载规则、目录文件和校验请求时。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("规则解析失败: {0}")]
    ParseError(String),

    #[error("未知的比较符: {0}")]
    UnknownComparator(String),

    #[error("未知的条件目标: {0}")]
    UnknownTarget(String),

    #[error("未知的展示单元类型: {0}")]
    UnknownUnitKind(String),

    #[error("文件读取失败: {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConditionError>;
