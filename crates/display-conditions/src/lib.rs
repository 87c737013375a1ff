//! 展示条件引擎
//!
//! 按页面浏览决定一个展示单元（广告、广告组或插入位）是否允许出现：
//! - 条件行按连接词分组为 OR-of-AND 结构
//! - 内容事实与访客事实分别由解析器求值
//! - 同步（实时页面状态）与异步（序列化上下文）两种求值模式结果一致
//! - 数据缺失、畸形或无法识别时一律放行

pub mod api;
pub mod compiler;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod geo;
pub mod host;
pub mod matcher;
pub mod memory;
pub mod models;
pub mod operators;
pub mod resolvers;
pub mod store;
pub mod value;

pub use compiler::{CompiledRow, RuleCompiler, RuleGroups};
pub use context::{ContextEntry, ContextSnapshot, SerializedContext};
pub use error::{ConditionError, Result};
pub use evaluator::ComparatorEvaluator;
pub use executor::{ConditionChecker, DisplayDecision, EvaluationOptions};
pub use host::{ArchiveTerm, ContentStore, PageFlag, PageState, Post, VisitorState};
pub use matcher::MultiValueMatcher;
pub use memory::{PostCatalog, StaticPage, VisitorProfile};
pub use models::{
    ConditionRow, EvaluationResult, FactDomain, RuleSet, Subject, UnitKind, UnitRules,
};
pub use operators::{Comparator, Connector, MatchPolicy};
pub use resolvers::{
    ConditionTarget, ContentResolver, ContentTarget, FactResolver, FactSource, NoCheck,
    ResolveCache, Resolution, VisitorResolver, VisitorTarget,
};
pub use store::RuleSetStore;
pub use value::{FactValue, Scalar, ValueType};
