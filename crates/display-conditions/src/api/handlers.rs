//! 路由处理器

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde_json::{Value, json};
use tracing::info;

use crate::executor::{ConditionChecker, DisplayDecision};
use crate::models::FactDomain;
use crate::resolvers::{ConditionTarget, ContentTarget, VisitorTarget};

use super::dto::{ApiResponse, EvaluateRequest, EvaluateResponse, TargetDescriptor};
use super::error::Result;
use super::state::AppState;

/// 异步评估
///
/// POST /v1/evaluate
///
/// 请求未携带规则时使用存储中该单元的规则，未配置的单元总是展示。
pub async fn evaluate(
    State(state): State<AppState>,
    payload: std::result::Result<Json<EvaluateRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<EvaluateResponse>>> {
    let Json(req) = payload?;
    let response = run_evaluation(&state, req)?;

    info!(
        subject = %response.subject,
        display = response.decision.display,
        "异步评估完成"
    );

    Ok(Json(ApiResponse::success(response)))
}

fn run_evaluation(state: &AppState, req: EvaluateRequest) -> Result<EvaluateResponse> {
    let subject = req.checked_subject()?;
    let rules = match req.rules {
        Some(rules) => rules,
        None => state.store.rules_for(&subject),
    };

    let snapshot = req.context.sanitize();
    let checker = ConditionChecker::from_snapshot(&snapshot, state.catalog.as_ref(), &req.visitor);

    if !(req.trace || state.trace_evaluations) {
        return Ok(EvaluateResponse {
            subject,
            decision: checker.check_unit(&rules, &subject),
            trace: Vec::new(),
        });
    }

    let content =
        checker.check_with_trace(rules.content.as_ref(), FactDomain::Content, &subject);
    let visitor =
        checker.check_with_trace(rules.visitor.as_ref(), FactDomain::Visitor, &subject);

    let trace = [&content, &visitor]
        .into_iter()
        .flat_map(|result| {
            result
                .evaluation_trace
                .iter()
                .map(move |line| format!("{}: {}", result.domain, line))
        })
        .collect();

    Ok(EvaluateResponse {
        subject,
        decision: DisplayDecision {
            content: content.passed,
            visitor: visitor.passed,
            display: content.passed && visitor.passed,
        },
        trace,
    })
}

/// 目标目录
///
/// GET /v1/targets
pub async fn list_targets() -> Json<ApiResponse<Vec<TargetDescriptor>>> {
    let mut targets: Vec<TargetDescriptor> = ContentTarget::catalog()
        .iter()
        .map(|target| describe(FactDomain::Content, target))
        .collect();
    targets.extend(
        VisitorTarget::catalog()
            .iter()
            .map(|target| describe(FactDomain::Visitor, target)),
    );

    Json(ApiResponse::success(targets))
}

fn describe<T: ConditionTarget>(domain: FactDomain, target: &T) -> TargetDescriptor {
    TargetDescriptor {
        domain,
        key: target.to_string(),
        value_type: target.value_type(),
        default_comparator: target.default_comparator(),
        allowed_comparators: target.allowed_comparators().to_vec(),
    }
}

/// 存活探针
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "display-conditions",
        "units": state.store.len(),
        "posts": state.catalog.len(),
    }))
}
