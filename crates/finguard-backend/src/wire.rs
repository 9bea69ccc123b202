//! Rule-data payloads as returned by the backend

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Record id that the backend may send as a number or a string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(i64),
    Text(String),
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireId::Number(n) => write!(f, "{}", n),
            WireId::Text(s) => f.write_str(s),
        }
    }
}

/// Accepts a JSON number, a numeric string or null (as 0). Database numeric
/// columns often arrive as strings.
fn amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Number(f64),
        Text(String),
    }

    match Option::<Amount>::deserialize(deserializer)? {
        Some(Amount::Number(n)) => Ok(n),
        Some(Amount::Text(s)) => Ok(s.trim().parse().unwrap_or(0.0)),
        None => Ok(0.0),
    }
}

fn optional_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Amount>::deserialize(deserializer)? {
        Some(Amount::Number(n)) => Some(n),
        Some(Amount::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}

/// One category row of `/api/budgets/summary`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetCategory {
    pub category: String,
    #[serde(default, deserialize_with = "amount")]
    pub spent: f64,
    #[serde(default, deserialize_with = "amount")]
    pub budget_limit: f64,
}

/// One row of `/api/bills/upcoming`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub id: WireId,
    pub name: String,
    #[serde(default, deserialize_with = "amount")]
    pub amount: f64,
    #[serde(rename = "dueDate")]
    pub due_date: String,
}

impl Bill {
    /// Due instant. Accepts RFC 3339 or a bare `YYYY-MM-DD` (local midnight).
    pub fn due_at(&self) -> Option<DateTime<Local>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&self.due_date) {
            return Some(dt.with_timezone(&Local));
        }

        let date = NaiveDate::parse_from_str(self.due_date.get(..10)?, "%Y-%m-%d").ok()?;
        Local
            .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
            .earliest()
    }
}

/// One row of `/api/goals/achievements`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalAchievement {
    pub id: WireId,
    pub name: String,
    #[serde(default, deserialize_with = "amount")]
    pub progress: f64,
    #[serde(rename = "justCompleted", default)]
    pub just_completed: bool,
    #[serde(rename = "milestoneHit", default)]
    pub milestone_hit: Option<u32>,
}

/// One row of `/api/anomalies`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(default)]
    pub id: Option<WireId>,
    pub description: String,
    #[serde(default, deserialize_with = "optional_amount")]
    pub amount: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
}

/// `/api/summary` for one month
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    #[serde(default, deserialize_with = "amount")]
    pub income: f64,
    #[serde(default, deserialize_with = "amount")]
    pub expenses: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    #[test]
    fn budget_amounts_accept_strings() {
        let row: BudgetCategory = serde_json::from_value(json!({
            "category": "Food",
            "spent": "1500.50",
            "budget_limit": 2000
        }))
        .unwrap();
        assert_eq!(row.spent, 1500.5);
        assert_eq!(row.budget_limit, 2000.0);

        let row: BudgetCategory =
            serde_json::from_value(json!({"category": "Misc", "spent": null})).unwrap();
        assert_eq!(row.spent, 0.0);
        assert_eq!(row.budget_limit, 0.0);
    }

    #[test]
    fn bill_due_date_formats() {
        let bill: Bill = serde_json::from_value(json!({
            "id": 7,
            "name": "Electricity",
            "amount": 1200,
            "dueDate": "2025-03-14"
        }))
        .unwrap();
        assert_eq!(bill.id.to_string(), "7");

        let due = bill.due_at().unwrap();
        assert_eq!((due.month(), due.day(), due.hour()), (3, 14, 0));

        let bill = Bill {
            due_date: "2025-03-14T00:00:00.000Z".into(),
            ..bill
        };
        assert!(bill.due_at().is_some());

        let bill = Bill {
            due_date: "soon".into(),
            ..bill
        };
        assert!(bill.due_at().is_none());
    }

    #[test]
    fn goal_camel_case_fields() {
        let goal: GoalAchievement = serde_json::from_value(json!({
            "id": "g-1",
            "name": "Emergency Fund",
            "progress": 50,
            "milestoneHit": 50
        }))
        .unwrap();
        assert_eq!(goal.id, WireId::Text("g-1".into()));
        assert!(!goal.just_completed);
        assert_eq!(goal.milestone_hit, Some(50));
    }

    #[test]
    fn anomaly_minimal() {
        let anomaly: Anomaly =
            serde_json::from_value(json!({"description": "Large purchase"})).unwrap();
        assert!(anomaly.id.is_none());
        assert!(anomaly.amount.is_none());
    }
}
