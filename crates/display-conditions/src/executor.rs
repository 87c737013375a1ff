//! 条件检查器
//!
//! 对一个事实域的规则集做 OR-of-AND 短路求值：
//! 组内遇到第一个不满足的行即判定该组失败，任一组通过即整体通过。
//! 无法检查的行（未知目标、上下文缺键）视为通过。

use chrono::{DateTime, Utc};
use display_shared::observability::metrics::{
    record_condition_check, record_fail_open, record_skipped_rows,
};
use serde::Serialize;
use std::time::Instant;
use tracing::debug;

use crate::compiler::{CompiledRow, RuleCompiler};
use crate::context::ContextSnapshot;
use crate::host::{ContentStore, PageState, VisitorState};
use crate::matcher::MultiValueMatcher;
use crate::models::{EvaluationResult, FactDomain, RuleSet, Subject, UnitRules};
use crate::resolvers::{
    ConditionTarget, ContentResolver, ContentTarget, FactResolver, FactSource, NoCheck,
    ResolveCache, VisitorResolver, VisitorTarget,
};

/// 求值选项
#[derive(Debug, Clone, Copy)]
pub struct EvaluationOptions {
    /// 计算内容发布天数时使用的当前时间
    pub now: DateTime<Utc>,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self { now: Utc::now() }
    }
}

/// 展示单元的最终判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayDecision {
    pub content: bool,
    pub visitor: bool,
    pub display: bool,
}

/// 单行的求值结果
enum RowOutcome {
    Matched(bool),
    /// 无法检查，按通过处理
    NoCheck(NoCheck),
    /// 目标属于另一个事实域，本域不参与
    Foreign,
}

/// 条件检查器
///
/// 持有一次页面浏览（或一次异步请求）的事实来源，可对多个展示单元重复调用。
/// 每次 `check` 都使用新的查询缓存。
pub struct ConditionChecker<'a> {
    source: FactSource<'a>,
    store: &'a dyn ContentStore,
    visitor: &'a dyn VisitorState,
    options: EvaluationOptions,
}

impl<'a> ConditionChecker<'a> {
    pub fn new(
        source: FactSource<'a>,
        store: &'a dyn ContentStore,
        visitor: &'a dyn VisitorState,
    ) -> Self {
        Self {
            source,
            store,
            visitor,
            options: EvaluationOptions::default(),
        }
    }

    /// 同步模式：直接读取实时页面状态
    pub fn live(
        page: &'a dyn PageState,
        store: &'a dyn ContentStore,
        visitor: &'a dyn VisitorState,
    ) -> Self {
        Self::new(FactSource::Live(page), store, visitor)
    }

    /// 异步模式：读取校验后的上下文快照
    pub fn from_snapshot(
        snapshot: &'a ContextSnapshot,
        store: &'a dyn ContentStore,
        visitor: &'a dyn VisitorState,
    ) -> Self {
        Self::new(FactSource::Snapshot(snapshot), store, visitor)
    }

    pub fn with_options(mut self, options: EvaluationOptions) -> Self {
        self.options = options;
        self
    }

    /// 检查一个事实域的规则集
    pub fn check(&self, rule_set: Option<&RuleSet>, domain: FactDomain, subject: &Subject) -> bool {
        self.evaluate(rule_set, domain, subject, false).passed
    }

    /// 检查并记录逐行追踪
    pub fn check_with_trace(
        &self,
        rule_set: Option<&RuleSet>,
        domain: FactDomain,
        subject: &Subject,
    ) -> EvaluationResult {
        self.evaluate(rule_set, domain, subject, true)
    }

    /// 检查展示单元的两个事实域，两者都通过才展示
    pub fn check_unit(&self, rules: &UnitRules, subject: &Subject) -> DisplayDecision {
        let content = self.check(rules.content.as_ref(), FactDomain::Content, subject);
        let visitor = self.check(rules.visitor.as_ref(), FactDomain::Visitor, subject);
        DisplayDecision {
            content,
            visitor,
            display: content && visitor,
        }
    }

    fn evaluate(
        &self,
        rule_set: Option<&RuleSet>,
        domain: FactDomain,
        subject: &Subject,
        trace: bool,
    ) -> EvaluationResult {
        let start = Instant::now();
        let mut result = EvaluationResult::new(domain, *subject);

        result.passed = match rule_set {
            Some(rule_set) if !rule_set.is_empty() => match domain {
                FactDomain::Content => {
                    let resolver =
                        ContentResolver::new(self.source, self.store, self.options.now);
                    self.evaluate_groups::<_, VisitorTarget>(
                        &resolver,
                        rule_set,
                        domain,
                        subject,
                        &mut result,
                        trace,
                    )
                }
                FactDomain::Visitor => {
                    let resolver = VisitorResolver::new(self.visitor);
                    self.evaluate_groups::<_, ContentTarget>(
                        &resolver,
                        rule_set,
                        domain,
                        subject,
                        &mut result,
                        trace,
                    )
                }
            },
            _ => {
                if trace {
                    result.evaluation_trace.push("规则集为空，放行".to_string());
                }
                true
            }
        };

        let elapsed = start.elapsed();
        result.evaluation_time_us = elapsed.as_micros() as i64;
        record_condition_check(domain.as_str(), result.passed, elapsed.as_secs_f64());

        debug!(
            subject = %subject,
            domain = %domain,
            mode = self.source.mode(),
            passed = result.passed,
            groups = result.groups_evaluated,
            "display condition checked"
        );

        result
    }

    /// 按组短路求值，`Other` 为另一个事实域的目标类型
    fn evaluate_groups<R, Other>(
        &self,
        resolver: &R,
        rule_set: &RuleSet,
        domain: FactDomain,
        subject: &Subject,
        result: &mut EvaluationResult,
        trace: bool,
    ) -> bool
    where
        R: FactResolver,
        Other: ConditionTarget,
    {
        let groups = RuleCompiler::group(rule_set);
        if groups.skipped > 0 {
            record_skipped_rows(groups.skipped);
        }

        let mut cache = ResolveCache::new();
        let mut any_evaluated = false;

        for (g, group) in groups.groups.iter().enumerate() {
            let mut evaluated = 0;
            let mut group_passed = true;

            for row in group {
                let outcome = Self::evaluate_row::<R, Other>(resolver, row, subject, &mut cache);
                let passed = match &outcome {
                    RowOutcome::Foreign => continue,
                    RowOutcome::Matched(matched) => *matched,
                    RowOutcome::NoCheck(reason) => {
                        debug!(
                            subject = %subject,
                            row = row.index,
                            target = %row.target,
                            reason = %reason,
                            "condition row cannot be checked, passing"
                        );
                        record_fail_open(domain.as_str(), reason.reason());
                        true
                    }
                };
                evaluated += 1;

                if trace {
                    result.evaluation_trace.push(format!(
                        "group[{}].row[{}]: {} {} {} => {}",
                        g,
                        row.index,
                        row.target,
                        row.comparator
                            .map(|c| c.as_str())
                            .unwrap_or("default"),
                        row.values,
                        match &outcome {
                            RowOutcome::NoCheck(reason) => format!("PASSED ({})", reason),
                            _ if passed => "MATCHED".to_string(),
                            _ => "NOT_MATCHED".to_string(),
                        }
                    ));
                }

                if !passed {
                    if trace {
                        result
                            .evaluation_trace
                            .push(format!("group[{}]: AND 短路 - 行 {} 不满足", g, row.index));
                    }
                    group_passed = false;
                    break;
                }
            }

            if evaluated == 0 {
                // 空分组（或仅含另一事实域的行）不参与判定
                continue;
            }
            any_evaluated = true;
            result.groups_evaluated += 1;

            if group_passed {
                if trace {
                    result
                        .evaluation_trace
                        .push(format!("group[{}]: 全部满足，OR 短路", g));
                }
                return true;
            }
        }

        if !any_evaluated {
            if trace {
                result
                    .evaluation_trace
                    .push("没有可求值的分组，放行".to_string());
            }
            return true;
        }

        false
    }

    fn evaluate_row<R, Other>(
        resolver: &R,
        row: &CompiledRow,
        subject: &Subject,
        cache: &mut ResolveCache,
    ) -> RowOutcome
    where
        R: FactResolver,
        Other: ConditionTarget,
    {
        let target = match row.target.parse::<R::Target>() {
            Ok(target) => target,
            Err(_) if row.target.parse::<Other>().is_ok() => return RowOutcome::Foreign,
            Err(_) => return RowOutcome::NoCheck(NoCheck::UnknownTarget(row.target.clone())),
        };

        match resolver.resolve(&target, subject, cache) {
            Ok(fact) => {
                let comparator = row
                    .comparator
                    .unwrap_or_else(|| target.default_comparator());
                let value_type = target.value_type();
                let acceptable = row.acceptable(value_type);
                RowOutcome::Matched(MultiValueMatcher::matches_fact(
                    &fact,
                    comparator,
                    &acceptable,
                    value_type,
                ))
            }
            Err(reason) => RowOutcome::NoCheck(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{MockContentStore, MockPageState, MockVisitorState, PageFlag, Post};
    use crate::models::ConditionRow;
    use chrono::TimeZone;
    use serde_json::json;

    fn options() -> EvaluationOptions {
        EvaluationOptions {
            now: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    fn page_in_post(post_id: u64) -> MockPageState {
        let mut page = MockPageState::new();
        page.expect_queried_post_id().return_const(Some(post_id));
        page.expect_is().returning(|flag| flag == PageFlag::Singular);
        page.expect_url()
            .returning(|| "https://example.com/news/ducks".to_string());
        page
    }

    fn store_with_categories(categories: Vec<u64>) -> MockContentStore {
        let mut store = MockContentStore::new();
        store.expect_post().returning(move |id| {
            Some(Post {
                id,
                post_type: "post".into(),
                author_id: Some(2),
                parent_id: None,
                published_at: None,
                content: String::new(),
                terms: [("category".to_string(), categories.clone())].into(),
            })
        });
        store
    }

    fn logged_out() -> MockVisitorState {
        let mut visitor = MockVisitorState::new();
        visitor.expect_is_logged_in().return_const(false);
        visitor
    }

    #[test]
    fn test_empty_rule_set_passes() {
        let page = MockPageState::new();
        let store = MockContentStore::new();
        let visitor = MockVisitorState::new();
        let checker = ConditionChecker::live(&page, &store, &visitor);

        assert!(checker.check(None, FactDomain::Content, &Subject::ad(1)));
        assert!(checker.check(Some(&RuleSet::default()), FactDomain::Visitor, &Subject::ad(1)));
    }

    #[test]
    fn test_and_group_short_circuits() {
        let page = page_in_post(10);
        let store = store_with_categories(vec![5]);
        let visitor = MockVisitorState::new();
        let checker = ConditionChecker::live(&page, &store, &visitor).with_options(options());

        let rules = RuleSet::new(vec![
            ConditionRow::new("category", "is", json!([9])),
            ConditionRow::new("url", "contains", json!("ducks")),
        ]);
        let result = checker.check_with_trace(Some(&rules), FactDomain::Content, &Subject::ad(1));

        assert!(!result.passed);
        assert_eq!(result.groups_evaluated, 1);
        assert!(result.evaluation_trace.iter().all(|line| !line.contains("row[1]:")));
    }

    #[test]
    fn test_or_groups_short_circuit() {
        let page = page_in_post(10);
        let store = store_with_categories(vec![5]);
        let visitor = MockVisitorState::new();
        let checker = ConditionChecker::live(&page, &store, &visitor).with_options(options());

        let rules = RuleSet::new(vec![
            ConditionRow::new("category", "is", json!([5])).or(),
            ConditionRow::new("url", "contains", json!("never-there")),
        ]);
        let result = checker.check_with_trace(Some(&rules), FactDomain::Content, &Subject::ad(1));

        assert!(result.passed);
        assert_eq!(result.groups_evaluated, 1);
    }

    #[test]
    fn test_unknown_target_passes() {
        let page = MockPageState::new();
        let store = MockContentStore::new();
        let visitor = MockVisitorState::new();
        let checker = ConditionChecker::live(&page, &store, &visitor);

        let rules = RuleSet::new(vec![ConditionRow::new("moon_phase", "is", json!("full"))]);
        assert!(checker.check(Some(&rules), FactDomain::Content, &Subject::ad(1)));
    }

    #[test]
    fn test_rows_of_other_domain_are_ignored() {
        let page = page_in_post(10);
        let store = store_with_categories(vec![5]);
        let visitor = logged_out();
        let checker = ConditionChecker::live(&page, &store, &visitor).with_options(options());

        let rules = RuleSet::new(vec![
            ConditionRow::new("category", "is", json!([5, 9])).or(),
            ConditionRow::new("logged_in", "is", json!(true)),
        ]);

        assert!(checker.check(Some(&rules), FactDomain::Content, &Subject::ad(1)));
        assert!(!checker.check(Some(&rules), FactDomain::Visitor, &Subject::ad(1)));
    }

    #[test]
    fn test_all_rows_malformed_passes() {
        let page = MockPageState::new();
        let store = MockContentStore::new();
        let visitor = MockVisitorState::new();
        let checker = ConditionChecker::live(&page, &store, &visitor);

        let rules = RuleSet::from_json(
            r#"[{"condition": "is", "values": 1, "connector": "or"},
                {"target": "url", "condition": "sounds_like", "values": "x"}]"#,
        )
        .unwrap();
        let result = checker.check_with_trace(Some(&rules), FactDomain::Content, &Subject::ad(1));

        assert!(result.passed);
        assert_eq!(result.groups_evaluated, 0);
    }

    #[test]
    fn test_check_unit_requires_both_domains() {
        let page = page_in_post(10);
        let store = store_with_categories(vec![5]);
        let visitor = logged_out();
        let checker = ConditionChecker::live(&page, &store, &visitor).with_options(options());

        let rules = UnitRules {
            content: Some(RuleSet::new(vec![ConditionRow::new(
                "category",
                "is",
                json!([5]),
            )])),
            visitor: Some(RuleSet::new(vec![ConditionRow::new(
                "logged_in",
                "is",
                json!(true),
            )])),
        };

        let decision = checker.check_unit(&rules, &Subject::ad(1));
        assert_eq!(
            decision,
            DisplayDecision {
                content: true,
                visitor: false,
                display: false,
            }
        );
    }

    #[test]
    fn test_post_lookup_is_cached_within_check() {
        let page = page_in_post(10);
        let mut store = MockContentStore::new();
        store.expect_post().times(1).returning(|id| {
            Some(Post {
                id,
                post_type: "page".into(),
                author_id: Some(2),
                parent_id: None,
                published_at: None,
                content: "hello".into(),
                terms: Default::default(),
            })
        });
        let visitor = MockVisitorState::new();
        let checker = ConditionChecker::live(&page, &store, &visitor).with_options(options());

        let rules = RuleSet::new(vec![
            ConditionRow::new("post_type", "is", json!(["page"])),
            ConditionRow::new("author", "is", json!([2])),
            ConditionRow::new("post_content", "contains", json!("HELLO")),
        ]);
        assert!(checker.check(Some(&rules), FactDomain::Content, &Subject::ad(1)));
    }
}
