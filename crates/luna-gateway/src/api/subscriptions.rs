use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use luna_common::{Error, Plan, UserId};
use luna_security::{PlanFeatures, verify_stripe_signature};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::{PlanStatus, SharedState};
use crate::stripe::{CheckoutRequest, CheckoutSession, WebhookEvent};

#[derive(Serialize)]
pub struct PlanInfo {
    pub plan: Plan,
    pub features: PlanFeatures,
    /// Whether checkout is available for this plan.
    pub purchasable: bool,
}

#[derive(Deserialize)]
pub struct CheckoutBody {
    pub plan: Plan,
}

fn billing_unavailable(what: &str) -> ApiError {
    ApiError::new(StatusCode::SERVICE_UNAVAILABLE, format!("{what} is not configured"))
}

/// GET /api/subscriptions
pub async fn current(State(state): State<SharedState>, AuthUser(user): AuthUser) -> ApiResult<Json<PlanStatus>> {
    Ok(Json(state.plan_status(&user.id)?))
}

/// GET /api/subscriptions/plans
pub async fn plans(State(state): State<SharedState>) -> Json<Vec<PlanInfo>> {
    let billing = &state.config.billing;
    Json(
        Plan::ALL
            .into_iter()
            .map(|plan| PlanInfo {
                plan,
                features: PlanFeatures::for_plan(plan),
                purchasable: plan.is_paid() && state.stripe.is_some() && billing.price_for(plan).is_some(),
            })
            .collect(),
    )
}

/// POST /api/subscriptions/checkout
pub async fn checkout(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Json(body): Json<CheckoutBody>,
) -> ApiResult<Json<CheckoutSession>> {
    if !body.plan.is_paid() {
        return Err(ApiError::bad_request("checkout is only available for paid plans"));
    }
    let subscription = state.db.get_subscription(&user.id)?;
    if subscription.plan.is_paid() && subscription.stripe_subscription_id.is_some() {
        return Err(Error::Conflict(format!(
            "already subscribed to the {} plan; cancel it before switching",
            subscription.plan
        ))
        .into());
    }
    let stripe = state.stripe.as_ref().ok_or_else(|| billing_unavailable("billing"))?;
    let price_id = state
        .config
        .billing
        .price_for(body.plan)
        .ok_or_else(|| billing_unavailable(&format!("a price for the {} plan", body.plan)))?;

    let frontend = state
        .config
        .gateway
        .frontend_url
        .clone()
        .unwrap_or_else(|| state.config.gateway.base_url());
    let frontend = frontend.trim_end_matches('/');
    let success_url = format!("{frontend}/subscription?status=success");
    let cancel_url = format!("{frontend}/subscription?status=cancelled");

    let session = stripe
        .create_checkout_session(&CheckoutRequest {
            user_id: &user.id,
            email: &user.email,
            customer_id: subscription.stripe_customer_id.as_deref(),
            plan: body.plan,
            price_id,
            success_url: &success_url,
            cancel_url: &cancel_url,
        })
        .await?;

    Ok(Json(session))
}

/// POST /api/subscriptions/cancel
///
/// Cancels the Stripe subscription when there is one and drops the account
/// to the free plan immediately.
pub async fn cancel(State(state): State<SharedState>, AuthUser(user): AuthUser) -> ApiResult<Json<PlanStatus>> {
    let subscription = state.db.get_subscription(&user.id)?;
    if let Some(stripe_id) = subscription.stripe_subscription_id.as_deref() {
        let stripe = state.stripe.as_ref().ok_or_else(|| billing_unavailable("billing"))?;
        stripe.cancel_subscription(stripe_id).await?;
    }

    state.db.set_plan(&user.id, Plan::Free)?;
    state.db.set_stripe_ids(&user.id, None, None)?;
    info!("user {} cancelled their subscription", user.id);
    Ok(Json(state.plan_status(&user.id)?))
}

/// POST /api/subscriptions/webhook
pub async fn webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    let billing = &state.config.billing;
    let secret = billing
        .stripe_webhook_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| billing_unavailable("the webhook secret"))?;
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("missing Stripe-Signature header"))?;

    verify_stripe_signature(
        signature,
        &body,
        secret,
        billing.webhook_tolerance_secs,
        Utc::now().timestamp(),
    )
    .map_err(|e| {
        warn!("rejected stripe webhook: {e}");
        ApiError::bad_request(e.to_string())
    })?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid webhook payload: {e}")))?;
    let object = &event.data.object;

    match event.kind.as_str() {
        "checkout.session.completed" => checkout_completed(&state, object)?,
        "customer.subscription.deleted" => subscription_deleted(&state, object)?,
        other => debug!("ignoring stripe event {other}"),
    }

    Ok(Json(json!({ "received": true })))
}

fn str_field<'a>(object: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    object.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

fn checkout_completed(state: &SharedState, session: &serde_json::Value) -> ApiResult<()> {
    let user_id = str_field(session, "client_reference_id")
        .or_else(|| session.pointer("/metadata/user_id").and_then(|v| v.as_str()))
        .map(UserId::from_raw)
        .ok_or_else(|| ApiError::bad_request("checkout session has no user reference"))?;
    let plan: Plan = session
        .pointer("/metadata/plan")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::bad_request("checkout session has no plan"))?
        .parse()?;

    if state.db.get_user(&user_id)?.is_none() {
        warn!("checkout completed for unknown user {user_id}");
        return Ok(());
    }

    state.db.set_plan(&user_id, plan)?;
    state.db.set_stripe_ids(
        &user_id,
        str_field(session, "customer"),
        str_field(session, "subscription"),
    )?;
    Ok(())
}

fn subscription_deleted(state: &SharedState, subscription: &serde_json::Value) -> ApiResult<()> {
    let Some(customer) = str_field(subscription, "customer") else {
        return Err(Error::Validation("subscription event has no customer".into()).into());
    };
    let Some(user_id) = state.db.find_user_by_stripe_customer(customer)? else {
        warn!("subscription deleted for unknown customer {customer}");
        return Ok(());
    };

    // Only the subscription currently on file may downgrade the account.
    let current = state.db.get_subscription(&user_id)?;
    let deleted_id = str_field(subscription, "id");
    if deleted_id.is_none() || deleted_id != current.stripe_subscription_id.as_deref() {
        debug!(
            "ignoring deletion of stale subscription {} for user {user_id}",
            deleted_id.unwrap_or("<none>")
        );
        return Ok(());
    }

    state.db.set_plan(&user_id, Plan::Free)?;
    state.db.set_stripe_ids(&user_id, None, None)?;
    info!("user {user_id} dropped to free after subscription deletion");
    Ok(())
}
