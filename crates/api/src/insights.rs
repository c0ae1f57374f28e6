//! Rule-based spending insights
//!
//! Pure functions from transaction/budget slices to an advice report. The
//! route layer fetches the rows; everything here is deterministic given the
//! inputs and the reference date.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::Date;

/// One transaction, as the insights engine sees it.
#[derive(Debug, Clone)]
pub struct TxnSlice {
    pub amount: f64,
    pub occurred_on: Date,
    pub category: String,
}

/// Core stats for the analysis window.
#[derive(Debug, Clone, Serialize)]
pub struct SpendingStats {
    pub days: u32,
    pub total_spent: f64,
    pub avg_per_day: f64,
    pub spend_by_category: BTreeMap<String, f64>,
    pub budgets: BTreeMap<String, f64>,
    pub transaction_count: usize,
    pub peak_day: Option<Date>,
    pub peak_day_amount: f64,
}

/// Per-category spend against its budget, if one exists.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryComparison {
    pub category: String,
    pub spent: f64,
    pub limit: Option<f64>,
    pub pct_of_budget: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Advice {
    pub summary: Vec<String>,
    pub warnings: Vec<String>,
    pub suggested_actions: Vec<String>,
    pub categories: Vec<CategoryComparison>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SafeToSpend {
    pub month_days_total: u32,
    pub days_elapsed: u32,
    pub days_left: u32,
    pub budget_total: f64,
    pub spent_so_far: f64,
    pub remaining_budget: f64,
    pub suggested_safe_per_day: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Goals {
    pub monthly_savings_target: Option<f64>,
}

/// The full report returned by the insights endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct InsightsReport {
    pub stats: SpendingStats,
    pub advice: Advice,
    pub safe_to_spend: SafeToSpend,
}

/// How aggressively the payoff planner assumes extra payments will be made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskLevel {
    /// Unknown values fall back to `medium` rather than erroring.
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }

    fn factor(self) -> f64 {
        match self {
            Self::Low => 0.8,
            Self::Medium => 1.0,
            Self::High => 1.2,
        }
    }
}

/// Payoff estimate for a given debt and monthly extra payment.
#[derive(Debug, Clone, Serialize)]
pub struct DebtPlan {
    pub total_debt: f64,
    pub monthly_extra: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_payment: Option<f64>,
    pub estimated_months: Option<f64>,
    pub style: RiskLevel,
    pub note: String,
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Very simple payoff planner: months to payoff from the extra payment alone,
/// scaled by the risk appetite. No interest modeling.
pub fn build_debt_plan(total_debt: f64, monthly_extra: f64, risk: RiskLevel) -> DebtPlan {
    if total_debt <= 0.0 || monthly_extra <= 0.0 {
        return DebtPlan {
            total_debt,
            monthly_extra,
            effective_payment: None,
            estimated_months: None,
            style: risk,
            note: "Provide a positive total_debt and monthly_extra to get a payoff estimate."
                .to_string(),
        };
    }

    let effective_payment = monthly_extra * risk.factor();
    let months = total_debt / effective_payment;
    DebtPlan {
        total_debt: round2(total_debt),
        monthly_extra: round2(monthly_extra),
        effective_payment: Some(round2(effective_payment)),
        estimated_months: Some(round1(months)),
        style: risk,
        note: "This is a rough estimate. Real payoff time will depend on interest rates and fees."
            .to_string(),
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Aggregate the window into totals, per-category and per-day sums.
pub fn summarize_spending(
    txns: &[TxnSlice],
    budgets: &BTreeMap<String, f64>,
    days: u32,
) -> SpendingStats {
    let mut total = 0.0;
    let mut by_cat: BTreeMap<String, f64> = BTreeMap::new();
    let mut by_day: BTreeMap<Date, f64> = BTreeMap::new();

    for t in txns {
        total += t.amount;
        *by_cat.entry(t.category.clone()).or_insert(0.0) += t.amount;
        *by_day.entry(t.occurred_on).or_insert(0.0) += t.amount;
    }

    let avg_per_day = if days > 0 { total / days as f64 } else { 0.0 };
    let peak = by_day
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(d, amt)| (*d, *amt));

    SpendingStats {
        days,
        total_spent: round2(total),
        avg_per_day: round2(avg_per_day),
        spend_by_category: by_cat.iter().map(|(k, v)| (k.clone(), round2(*v))).collect(),
        budgets: budgets.clone(),
        transaction_count: txns.len(),
        peak_day: peak.map(|(d, _)| d),
        peak_day_amount: peak.map(|(_, amt)| round2(amt)).unwrap_or(0.0),
    }
}

fn compare_to_budgets(
    by_cat: &BTreeMap<String, f64>,
    budgets: &BTreeMap<String, f64>,
) -> Vec<CategoryComparison> {
    by_cat
        .iter()
        .map(|(cat, spent)| {
            let limit = budgets.get(cat).copied();
            let pct = limit
                .filter(|l| *l > 0.0)
                .map(|l| ((spent / l) * 1000.0).round() / 10.0);
            CategoryComparison {
                category: cat.clone(),
                spent: *spent,
                limit,
                pct_of_budget: pct,
            }
        })
        .collect()
}

/// Spend above this in an unbudgeted category triggers a warning.
const UNBUDGETED_SPEND_THRESHOLD: f64 = 100.0;

fn detect_anomalies(
    by_cat: &BTreeMap<String, f64>,
    budgets: &BTreeMap<String, f64>,
) -> Vec<String> {
    let mut messages = Vec::new();
    for (cat, spent) in by_cat {
        match budgets.get(cat).copied().filter(|l| *l > 0.0) {
            None => {
                if *spent >= UNBUDGETED_SPEND_THRESHOLD {
                    messages.push(format!(
                        "High spend in '{cat}' (${spent:.2}) but no budget set. \
                         Consider creating a budget here."
                    ));
                }
            }
            Some(limit) => {
                let pct = spent / limit;
                if pct >= 1.5 {
                    messages.push(format!(
                        "Severe overspend in '{cat}' (${spent:.2} vs ${limit:.2}, {:.0}% of budget).",
                        pct * 100.0
                    ));
                } else if pct >= 1.1 {
                    messages.push(format!(
                        "You're over budget in '{cat}' (${spent:.2} vs ${limit:.2}, {:.0}% of budget).",
                        pct * 100.0
                    ));
                } else if pct >= 0.9 {
                    messages.push(format!(
                        "'{cat}' is right at the edge of your budget ({:.0}% used).",
                        pct * 100.0
                    ));
                }
            }
        }
    }
    messages
}

/// Rough safe-to-spend calculation for the rest of the month.
pub fn safe_to_spend(stats: &SpendingStats, today: Date) -> SafeToSpend {
    let month_days_total = time::util::days_in_year_month(today.year(), today.month()) as u32;

    let days_elapsed = stats.days.min(today.day() as u32);
    let days_left = month_days_total.saturating_sub(days_elapsed);
    let budget_total: f64 = stats.budgets.values().sum();
    let remaining = (budget_total - stats.total_spent).max(0.0);

    let per_day = if days_left > 0 && remaining > 0.0 {
        remaining / days_left as f64
    } else {
        0.0
    };

    SafeToSpend {
        month_days_total,
        days_elapsed,
        days_left,
        budget_total: round2(budget_total),
        spent_so_far: round2(stats.total_spent),
        remaining_budget: round2(remaining),
        suggested_safe_per_day: round2(per_day),
    }
}

const CORE_CATEGORIES: &[&str] = &["Rent", "Housing", "Groceries", "Utilities", "Savings"];

/// Convert stats + optional goals into human-readable advice.
pub fn generate_advice(stats: &SpendingStats, goals: &Goals) -> Advice {
    let mut summary = Vec::new();
    let mut warnings = Vec::new();
    let mut actions = Vec::new();

    summary.push(format!(
        "You spent about ${:.2} in the last {} days (~${:.2} per day).",
        stats.total_spent, stats.days, stats.avg_per_day
    ));
    if let Some(peak_day) = stats.peak_day {
        summary.push(format!(
            "Your highest spending day was {peak_day} with about ${:.2}.",
            stats.peak_day_amount
        ));
    }

    if stats.transaction_count == 0 {
        warnings.push(
            "I didn't see any transactions for this period. \
             Make sure your bank connections are syncing correctly."
                .to_string(),
        );
        actions.push(
            "Connect at least one bank or card and import transactions so I can \
             analyze your spending."
                .to_string(),
        );
        return Advice {
            summary,
            warnings,
            suggested_actions: actions,
            categories: Vec::new(),
        };
    }

    let categories = compare_to_budgets(&stats.spend_by_category, &stats.budgets);
    warnings.extend(detect_anomalies(&stats.spend_by_category, &stats.budgets));

    let missing: Vec<&str> = CORE_CATEGORIES
        .iter()
        .filter(|c| !stats.budgets.contains_key(**c))
        .copied()
        .collect();
    if !missing.is_empty() {
        actions.push(format!(
            "You don't have budgets for some important areas: {}. \
             Add budgets so I can help you stay on track.",
            missing.join(", ")
        ));
    }

    if let Some(target) = goals.monthly_savings_target {
        let budget_total: f64 = stats.budgets.values().sum();
        let inferred_savings = (budget_total - stats.total_spent).max(0.0);
        if inferred_savings >= target {
            summary.push(format!(
                "Based on your budgets vs. spending, you're on track to save \
                 around ${inferred_savings:.2} this month (target: ${target:.2})."
            ));
        } else {
            warnings.push(format!(
                "You're currently behind your savings target of ${target:.2} \
                 this month. Consider trimming some flexible categories."
            ));
        }
    }

    if stats.total_spent > 0.0 {
        let target_savings = stats.total_spent * 0.10;
        actions.push(format!(
            "If possible, try to move around ${target_savings:.2} from this period into \
             savings or debt payoff."
        ));
    }

    Advice {
        summary,
        warnings,
        suggested_actions: actions,
        categories,
    }
}

/// Assemble the full report.
pub fn build_report(
    txns: &[TxnSlice],
    budgets: &BTreeMap<String, f64>,
    days: u32,
    goals: &Goals,
    today: Date,
) -> InsightsReport {
    let stats = summarize_spending(txns, budgets, days);
    let advice = generate_advice(&stats, goals);
    let safe = safe_to_spend(&stats, today);
    InsightsReport {
        stats,
        advice,
        safe_to_spend: safe,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use time::macros::date;

    fn txn(amount: f64, day: Date, category: &str) -> TxnSlice {
        TxnSlice {
            amount,
            occurred_on: day,
            category: category.to_string(),
        }
    }

    #[test]
    fn test_summary_aggregates() {
        let txns = vec![
            txn(50.0, date!(2026 - 08 - 01), "Groceries"),
            txn(30.0, date!(2026 - 08 - 01), "Groceries"),
            txn(20.0, date!(2026 - 08 - 02), "Dining"),
        ];
        let stats = summarize_spending(&txns, &BTreeMap::new(), 30);

        assert_eq!(stats.total_spent, 100.0);
        assert_eq!(stats.transaction_count, 3);
        assert_eq!(stats.spend_by_category["Groceries"], 80.0);
        assert_eq!(stats.peak_day, Some(date!(2026 - 08 - 01)));
        assert_eq!(stats.peak_day_amount, 80.0);
        assert!((stats.avg_per_day - 100.0 / 30.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_window_advises_connecting_a_bank() {
        let stats = summarize_spending(&[], &BTreeMap::new(), 30);
        let advice = generate_advice(&stats, &Goals::default());

        assert_eq!(stats.transaction_count, 0);
        assert!(!advice.warnings.is_empty());
        assert!(advice.suggested_actions[0].contains("Connect at least one bank"));
        assert!(advice.categories.is_empty());
    }

    #[test]
    fn test_overspend_warnings_by_severity() {
        let budgets: BTreeMap<String, f64> = [
            ("Groceries".to_string(), 100.0),
            ("Dining".to_string(), 100.0),
            ("Transit".to_string(), 100.0),
        ]
        .into();
        let by_cat: BTreeMap<String, f64> = [
            ("Groceries".to_string(), 160.0), // >= 150%: severe
            ("Dining".to_string(), 120.0),    // >= 110%: over
            ("Transit".to_string(), 95.0),    // 90-110%: at the edge
        ]
        .into();

        let messages = detect_anomalies(&by_cat, &budgets);
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().any(|m| m.contains("Severe overspend in 'Groceries'")));
        assert!(messages.iter().any(|m| m.contains("over budget in 'Dining'")));
        assert!(messages.iter().any(|m| m.contains("'Transit' is right at the edge")));
    }

    #[test]
    fn test_unbudgeted_spend_flagged_above_threshold() {
        let by_cat: BTreeMap<String, f64> =
            [("Gadgets".to_string(), 250.0), ("Coffee".to_string(), 40.0)].into();
        let messages = detect_anomalies(&by_cat, &BTreeMap::new());

        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("Gadgets"));
    }

    #[test]
    fn test_safe_to_spend_math() {
        let budgets: BTreeMap<String, f64> = [("Groceries".to_string(), 600.0)].into();
        let txns = vec![txn(300.0, date!(2026 - 08 - 05), "Groceries")];
        let stats = summarize_spending(&txns, &budgets, 10);

        let safe = safe_to_spend(&stats, date!(2026 - 08 - 10));
        assert_eq!(safe.month_days_total, 31);
        assert_eq!(safe.days_elapsed, 10);
        assert_eq!(safe.days_left, 21);
        assert_eq!(safe.remaining_budget, 300.0);
        assert!((safe.suggested_safe_per_day - 300.0 / 21.0).abs() < 0.01);
    }

    #[test]
    fn test_safe_to_spend_never_negative() {
        let budgets: BTreeMap<String, f64> = [("Groceries".to_string(), 100.0)].into();
        let txns = vec![txn(500.0, date!(2026 - 08 - 05), "Groceries")];
        let stats = summarize_spending(&txns, &budgets, 10);

        let safe = safe_to_spend(&stats, date!(2026 - 08 - 10));
        assert_eq!(safe.remaining_budget, 0.0);
        assert_eq!(safe.suggested_safe_per_day, 0.0);
    }

    #[test]
    fn test_savings_goal_feedback() {
        let budgets: BTreeMap<String, f64> = [("Groceries".to_string(), 500.0)].into();
        let txns = vec![txn(100.0, date!(2026 - 08 - 05), "Groceries")];
        let stats = summarize_spending(&txns, &budgets, 30);

        // 500 budget - 100 spent = 400 inferred savings
        let on_track = generate_advice(
            &stats,
            &Goals {
                monthly_savings_target: Some(300.0),
            },
        );
        assert!(on_track.summary.iter().any(|m| m.contains("on track to save")));

        let behind = generate_advice(
            &stats,
            &Goals {
                monthly_savings_target: Some(450.0),
            },
        );
        assert!(behind.warnings.iter().any(|m| m.contains("behind your savings target")));
    }

    #[test]
    fn test_debt_plan_estimates_months() {
        let plan = build_debt_plan(1200.0, 100.0, RiskLevel::Medium);
        assert_eq!(plan.effective_payment, Some(100.0));
        assert_eq!(plan.estimated_months, Some(12.0));

        // High appetite scales the assumed payment up, shortening the estimate.
        let aggressive = build_debt_plan(1000.0, 100.0, RiskLevel::High);
        assert_eq!(aggressive.effective_payment, Some(120.0));
        assert_eq!(aggressive.estimated_months, Some(8.3));

        let cautious = build_debt_plan(1000.0, 100.0, RiskLevel::Low);
        assert_eq!(cautious.effective_payment, Some(80.0));
        assert_eq!(cautious.estimated_months, Some(12.5));
    }

    #[test]
    fn test_debt_plan_rejects_non_positive_inputs() {
        for (debt, extra) in [(0.0, 100.0), (-50.0, 100.0), (1000.0, 0.0)] {
            let plan = build_debt_plan(debt, extra, RiskLevel::Medium);
            assert!(plan.estimated_months.is_none());
            assert!(plan.effective_payment.is_none());
            assert!(plan.note.contains("positive total_debt"));
        }
    }

    #[test]
    fn test_risk_parse_falls_back_to_medium() {
        assert_eq!(RiskLevel::parse_lenient("low"), RiskLevel::Low);
        assert_eq!(RiskLevel::parse_lenient("high"), RiskLevel::High);
        assert_eq!(RiskLevel::parse_lenient("yolo"), RiskLevel::Medium);
    }

    #[test]
    fn test_missing_core_budgets_prompt() {
        let budgets: BTreeMap<String, f64> = [("Groceries".to_string(), 500.0)].into();
        let txns = vec![txn(10.0, date!(2026 - 08 - 05), "Groceries")];
        let stats = summarize_spending(&txns, &budgets, 30);

        let advice = generate_advice(&stats, &Goals::default());
        let prompt = advice
            .suggested_actions
            .iter()
            .find(|a| a.contains("important areas"))
            .unwrap();
        assert!(prompt.contains("Rent"));
        assert!(!prompt.contains("Groceries,"));
    }
}
