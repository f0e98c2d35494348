//! Sales Goal Aggregate

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::TenantId;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SalesGoal {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub period: GoalPeriod,
    pub target_amount: Decimal,
    pub start_date: NaiveDate,
    pub active: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalPeriod { Daily, Weekly, Monthly, Yearly }

impl GoalPeriod {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Daily => "daily", Self::Weekly => "weekly", Self::Monthly => "monthly", Self::Yearly => "yearly" }
    }

    /// First day of the period containing `today`. Weeks start on Monday.
    pub fn period_start(&self, today: NaiveDate) -> NaiveDate {
        match self {
            Self::Daily => today,
            Self::Weekly => today - Duration::days(today.weekday().num_days_from_monday() as i64),
            Self::Monthly => today.with_day(1).unwrap_or(today),
            Self::Yearly => NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
        }
    }
}

impl FromStr for GoalPeriod {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily), "weekly" => Ok(Self::Weekly), "monthly" => Ok(Self::Monthly), "yearly" => Ok(Self::Yearly),
            other => Err(format!("unknown goal period: {other}")),
        }
    }
}

impl SalesGoal {
    pub fn create(tenant_id: TenantId, period: GoalPeriod, target_amount: Decimal, start_date: NaiveDate) -> Self {
        Self { id: Uuid::now_v7(), tenant_id, period, target_amount, start_date, active: true }
    }

    /// Start of the period being measured at `now`, never earlier than the goal's start date.
    pub fn current_period_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let start = self.period.period_start(now.date_naive()).max(self.start_date);
        Utc.from_utc_datetime(&start.and_time(chrono::NaiveTime::MIN))
    }
}
