// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Commerce gateway (`commerce@v1`): catalog, cart and orders.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{params, Dispatch, GatewayError, GatewayRequest, Volatility};

pub const RECOMMENDATIONS_WORKFLOW: &str = "enriched-recommendations";

const MAX_CART_QUANTITY: u32 = 100;
const MAX_RECOMMENDATIONS: u32 = 20;
const DEFAULT_RECOMMENDATIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum CommerceRequest {
    ListProducts,
    GetProduct {
        product_id: String,
    },
    SearchProducts {
        query: String,
    },
    GetCart {
        user_id: String,
    },
    AddToCart {
        user_id: String,
        product_id: String,
        quantity: u32,
    },
    EmptyCart {
        user_id: String,
    },
    PlaceOrder {
        user_id: String,
        email: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        currency: Option<String>,
        /// Shipping address, passed through to the orders agent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        address: Option<serde_json::Value>,
    },
    Recommendations {
        user_id: String,
        /// Products the user is looking at
        #[serde(default)]
        product_ids: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },
}

fn required(field: &str, value: &str) -> Result<(), GatewayError> {
    if value.trim().is_empty() {
        return Err(GatewayError::invalid(format!("'{}' must not be empty", field)));
    }
    Ok(())
}

impl GatewayRequest for CommerceRequest {
    const GATEWAY: &'static str = "commerce@v1";

    fn operation(&self) -> &'static str {
        match self {
            CommerceRequest::ListProducts => "list_products",
            CommerceRequest::GetProduct { .. } => "get_product",
            CommerceRequest::SearchProducts { .. } => "search_products",
            CommerceRequest::GetCart { .. } => "get_cart",
            CommerceRequest::AddToCart { .. } => "add_to_cart",
            CommerceRequest::EmptyCart { .. } => "empty_cart",
            CommerceRequest::PlaceOrder { .. } => "place_order",
            CommerceRequest::Recommendations { .. } => "recommendations",
        }
    }

    fn validate(&self) -> Result<(), GatewayError> {
        match self {
            CommerceRequest::ListProducts => Ok(()),
            CommerceRequest::GetProduct { product_id } => required("productId", product_id),
            CommerceRequest::SearchProducts { query } => required("query", query),
            CommerceRequest::GetCart { user_id } | CommerceRequest::EmptyCart { user_id } => {
                required("userId", user_id)
            }
            CommerceRequest::AddToCart {
                user_id,
                product_id,
                quantity,
            } => {
                required("userId", user_id)?;
                required("productId", product_id)?;
                if !(1..=MAX_CART_QUANTITY).contains(quantity) {
                    return Err(GatewayError::invalid(format!(
                        "'quantity' must be between 1 and {}",
                        MAX_CART_QUANTITY
                    )));
                }
                Ok(())
            }
            CommerceRequest::PlaceOrder {
                user_id,
                email,
                currency,
                address,
            } => {
                required("userId", user_id)?;
                if !email.contains('@') {
                    return Err(GatewayError::invalid("'email' is not an email address"));
                }
                if let Some(currency) = currency {
                    let code = currency.trim();
                    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                        return Err(GatewayError::invalid("'currency' must be an ISO 4217 code"));
                    }
                }
                if address.as_ref().is_some_and(|a| !a.is_object()) {
                    return Err(GatewayError::invalid("'address' must be an object"));
                }
                Ok(())
            }
            CommerceRequest::Recommendations { user_id, limit, .. } => {
                required("userId", user_id)?;
                if limit.is_some_and(|l| l == 0 || l > MAX_RECOMMENDATIONS) {
                    return Err(GatewayError::invalid(format!(
                        "'limit' must be between 1 and {}",
                        MAX_RECOMMENDATIONS
                    )));
                }
                Ok(())
            }
        }
    }

    fn normalize(self) -> Self {
        match self {
            CommerceRequest::GetProduct { product_id } => CommerceRequest::GetProduct {
                product_id: product_id.trim().to_string(),
            },
            CommerceRequest::SearchProducts { query } => CommerceRequest::SearchProducts {
                query: query
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_lowercase(),
            },
            CommerceRequest::GetCart { user_id } => CommerceRequest::GetCart {
                user_id: user_id.trim().to_string(),
            },
            CommerceRequest::AddToCart {
                user_id,
                product_id,
                quantity,
            } => CommerceRequest::AddToCart {
                user_id: user_id.trim().to_string(),
                product_id: product_id.trim().to_string(),
                quantity,
            },
            CommerceRequest::EmptyCart { user_id } => CommerceRequest::EmptyCart {
                user_id: user_id.trim().to_string(),
            },
            CommerceRequest::PlaceOrder {
                user_id,
                email,
                currency,
                address,
            } => CommerceRequest::PlaceOrder {
                user_id: user_id.trim().to_string(),
                email: email.trim().to_lowercase(),
                currency: Some(
                    currency
                        .map(|c| c.trim().to_uppercase())
                        .unwrap_or_else(|| "USD".to_string()),
                ),
                address,
            },
            CommerceRequest::Recommendations {
                user_id,
                mut product_ids,
                limit,
            } => {
                product_ids.iter_mut().for_each(|id| *id = id.trim().to_string());
                product_ids.retain(|id| !id.is_empty());
                product_ids.sort();
                product_ids.dedup();
                CommerceRequest::Recommendations {
                    user_id: user_id.trim().to_string(),
                    product_ids,
                    limit: Some(limit.unwrap_or(DEFAULT_RECOMMENDATIONS)),
                }
            }
            other => other,
        }
    }

    fn volatility(&self) -> Volatility {
        match self {
            CommerceRequest::ListProducts
            | CommerceRequest::GetProduct { .. }
            | CommerceRequest::SearchProducts { .. } => Volatility::Static,
            CommerceRequest::GetCart { .. } | CommerceRequest::Recommendations { .. } => {
                Volatility::Volatile
            }
            CommerceRequest::AddToCart { .. }
            | CommerceRequest::EmptyCart { .. }
            | CommerceRequest::PlaceOrder { .. } => Volatility::Uncacheable,
        }
    }

    fn plan(&self) -> Dispatch {
        let capability = match self {
            CommerceRequest::Recommendations { .. } => {
                return Dispatch::Workflow {
                    name: RECOMMENDATIONS_WORKFLOW,
                    input: params(self),
                }
            }
            CommerceRequest::ListProducts => "catalog.list@v1",
            CommerceRequest::GetProduct { .. } => "catalog.get@v1",
            CommerceRequest::SearchProducts { .. } => "catalog.search@v1",
            CommerceRequest::GetCart { .. } => "cart.get@v1",
            CommerceRequest::AddToCart { .. } => "cart.add@v1",
            CommerceRequest::EmptyCart { .. } => "cart.empty@v1",
            CommerceRequest::PlaceOrder { .. } => "orders.place@v1",
        };
        Dispatch::Capability {
            capability,
            payload: params(self),
        }
    }

    fn fallback_default(&self) -> Option<serde_json::Value> {
        match self {
            CommerceRequest::ListProducts | CommerceRequest::SearchProducts { .. } => {
                Some(json!({"products": []}))
            }
            CommerceRequest::Recommendations { .. } => Some(json!({"recommendations": []})),
            _ => None,
        }
    }
}
