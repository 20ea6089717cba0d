// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Analytics gateway (`analytics@v1`): sales, users, inventory and live metrics.

use serde::{Deserialize, Serialize};

use super::{params, Dispatch, GatewayError, GatewayRequest, Volatility};

const MAX_SEGMENTS: u32 = 100;
const MAX_PREDICTION_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    LastHour,
    #[default]
    #[serde(rename = "24h")]
    LastDay,
    #[serde(rename = "7d")]
    LastWeek,
    #[serde(rename = "30d")]
    LastMonth,
    #[serde(rename = "90d")]
    LastQuarter,
}

impl TimeRange {
    fn label(&self) -> &'static str {
        match self {
            TimeRange::LastHour => "1h",
            TimeRange::LastDay => "24h",
            TimeRange::LastWeek => "7d",
            TimeRange::LastMonth => "30d",
            TimeRange::LastQuarter => "90d",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorType {
    Browsing,
    Purchasing,
    Cart,
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    Demographic,
    #[default]
    Behavioral,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryMetric {
    #[default]
    Turnover,
    StockLevels,
    DemandForecast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealtimeMetric {
    #[default]
    Traffic,
    Sales,
    Performance,
    Errors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendSubject {
    Sales,
    Products,
    Users,
    Categories,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Frontend,
    Backend,
    Database,
    Agents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceMetric {
    #[default]
    ResponseTime,
    Throughput,
    ErrorRate,
    Availability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AnalyticsRequest {
    Sales {
        #[serde(default)]
        time_range: TimeRange,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        product_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
    },
    Revenue {
        #[serde(default)]
        time_range: TimeRange,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        currency: Option<String>,
    },
    UserBehavior {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        #[serde(default)]
        time_range: TimeRange,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        behavior_type: Option<BehaviorType>,
    },
    UserSegments {
        #[serde(default)]
        segment_type: SegmentType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },
    Inventory {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        product_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
        #[serde(default)]
        metric: InventoryMetric,
    },
    Realtime {
        #[serde(default)]
        metric_type: RealtimeMetric,
    },
    Trends {
        data_type: TrendSubject,
        /// One of 7d, 30d, 90d; 30d when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_range: Option<TimeRange>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prediction_days: Option<u32>,
    },
    Performance {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component: Option<Component>,
        #[serde(default)]
        metric: PerformanceMetric,
    },
}

fn historical(range: TimeRange) -> Result<(), GatewayError> {
    if range == TimeRange::LastQuarter {
        return Err(GatewayError::invalid(format!(
            "'timeRange' {} is only available for trends",
            range.label()
        )));
    }
    Ok(())
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl GatewayRequest for AnalyticsRequest {
    const GATEWAY: &'static str = "analytics@v1";

    fn operation(&self) -> &'static str {
        match self {
            AnalyticsRequest::Sales { .. } => "sales",
            AnalyticsRequest::Revenue { .. } => "revenue",
            AnalyticsRequest::UserBehavior { .. } => "user_behavior",
            AnalyticsRequest::UserSegments { .. } => "user_segments",
            AnalyticsRequest::Inventory { .. } => "inventory",
            AnalyticsRequest::Realtime { .. } => "realtime",
            AnalyticsRequest::Trends { .. } => "trends",
            AnalyticsRequest::Performance { .. } => "performance",
        }
    }

    fn validate(&self) -> Result<(), GatewayError> {
        match self {
            AnalyticsRequest::Sales { time_range, .. }
            | AnalyticsRequest::Revenue { time_range, .. }
            | AnalyticsRequest::UserBehavior { time_range, .. } => historical(*time_range),
            AnalyticsRequest::UserSegments { limit, .. } => {
                if limit.is_some_and(|l| l == 0 || l > MAX_SEGMENTS) {
                    return Err(GatewayError::invalid(format!(
                        "'limit' must be between 1 and {}",
                        MAX_SEGMENTS
                    )));
                }
                Ok(())
            }
            AnalyticsRequest::Trends {
                time_range,
                prediction_days,
                ..
            } => {
                if matches!(time_range, Some(TimeRange::LastHour | TimeRange::LastDay)) {
                    return Err(GatewayError::invalid("'timeRange' for trends must be 7d, 30d or 90d"));
                }
                if prediction_days.is_some_and(|d| d == 0 || d > MAX_PREDICTION_DAYS) {
                    return Err(GatewayError::invalid(format!(
                        "'predictionDays' must be between 1 and {}",
                        MAX_PREDICTION_DAYS
                    )));
                }
                Ok(())
            }
            AnalyticsRequest::Inventory { .. }
            | AnalyticsRequest::Realtime { .. }
            | AnalyticsRequest::Performance { .. } => Ok(()),
        }
    }

    fn normalize(self) -> Self {
        match self {
            AnalyticsRequest::Sales {
                time_range,
                product_id,
                category,
            } => AnalyticsRequest::Sales {
                time_range,
                product_id: trimmed(product_id),
                category: trimmed(category).map(|c| c.to_lowercase()),
            },
            AnalyticsRequest::Revenue { time_range, currency } => AnalyticsRequest::Revenue {
                time_range,
                currency: Some(
                    trimmed(currency)
                        .map(|c| c.to_uppercase())
                        .unwrap_or_else(|| "USD".to_string()),
                ),
            },
            AnalyticsRequest::UserBehavior {
                user_id,
                time_range,
                behavior_type,
            } => AnalyticsRequest::UserBehavior {
                user_id: trimmed(user_id),
                time_range,
                behavior_type,
            },
            AnalyticsRequest::UserSegments { segment_type, limit } => AnalyticsRequest::UserSegments {
                segment_type,
                limit: Some(limit.unwrap_or(10)),
            },
            AnalyticsRequest::Inventory {
                product_id,
                category,
                metric,
            } => AnalyticsRequest::Inventory {
                product_id: trimmed(product_id),
                category: trimmed(category).map(|c| c.to_lowercase()),
                metric,
            },
            AnalyticsRequest::Trends {
                data_type,
                time_range,
                prediction_days,
            } => AnalyticsRequest::Trends {
                data_type,
                time_range: Some(time_range.unwrap_or(TimeRange::LastMonth)),
                prediction_days: Some(prediction_days.unwrap_or(7)),
            },
            other => other,
        }
    }

    fn volatility(&self) -> Volatility {
        match self {
            AnalyticsRequest::UserSegments { .. } | AnalyticsRequest::Trends { .. } => Volatility::Volatile,
            _ => Volatility::Realtime,
        }
    }

    fn plan(&self) -> Dispatch {
        let capability = match self {
            AnalyticsRequest::Sales { .. } => "analytics.sales@v1",
            AnalyticsRequest::Revenue { .. } => "analytics.revenue@v1",
            AnalyticsRequest::UserBehavior { .. } => "analytics.user-behavior@v1",
            AnalyticsRequest::UserSegments { .. } => "analytics.user-segments@v1",
            AnalyticsRequest::Inventory { .. } => "analytics.inventory@v1",
            AnalyticsRequest::Realtime { .. } => "analytics.realtime@v1",
            AnalyticsRequest::Trends { .. } => "analytics.trends@v1",
            AnalyticsRequest::Performance { .. } => "analytics.performance@v1",
        };
        Dispatch::Capability {
            capability,
            payload: params(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::gateway::fingerprint;
    use serde_json::json;

    #[test]
    fn test_defaults_are_explicit_after_normalize() {
        let implicit: AnalyticsRequest = serde_json::from_value(json!({"operation": "revenue"})).unwrap();
        let explicit: AnalyticsRequest = serde_json::from_value(json!({
            "operation": "revenue",
            "timeRange": "24h",
            "currency": "usd"
        }))
        .unwrap();
        assert_eq!(implicit.clone().normalize(), explicit.clone().normalize());
        assert_eq!(fingerprint(&implicit.normalize()), fingerprint(&explicit.normalize()));
    }

    #[test]
    fn test_trend_ranges() {
        let request: AnalyticsRequest = serde_json::from_value(json!({
            "operation": "trends",
            "dataType": "sales",
            "timeRange": "1h"
        }))
        .unwrap();
        assert!(request.validate().is_err());

        let quarter: AnalyticsRequest = serde_json::from_value(json!({
            "operation": "sales",
            "timeRange": "90d"
        }))
        .unwrap();
        assert!(quarter.validate().is_err());

        let unknown = serde_json::from_value::<AnalyticsRequest>(json!({
            "operation": "sales",
            "timeRange": "2y"
        }));
        assert!(unknown.is_err());
    }

    #[test]
    fn test_live_metrics_are_realtime() {
        let request = AnalyticsRequest::Realtime {
            metric_type: RealtimeMetric::Errors,
        };
        assert_eq!(request.volatility(), Volatility::Realtime);
        assert_eq!(
            request.plan(),
            Dispatch::Capability {
                capability: "analytics.realtime@v1",
                payload: json!({"metricType": "errors"}),
            }
        );
    }
}
