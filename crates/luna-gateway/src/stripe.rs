use luna_common::{Error, Plan, Result, UserId};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Minimal Stripe REST client covering Checkout and subscription cancellation.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// What a checkout session is for.
pub struct CheckoutRequest<'a> {
    pub user_id: &'a UserId,
    pub email: &'a str,
    pub customer_id: Option<&'a str>,
    pub plan: Plan,
    pub price_id: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key: secret_key.into(),
            api_base: api_base.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.api_base.trim_end_matches('/'))
    }

    #[instrument(skip(self, request), fields(user = %request.user_id, plan = %request.plan))]
    pub async fn create_checkout_session(&self, request: &CheckoutRequest<'_>) -> Result<CheckoutSession> {
        let mut form: Vec<(&str, &str)> = vec![
            ("mode", "subscription"),
            ("line_items[0][price]", request.price_id),
            ("line_items[0][quantity]", "1"),
            ("client_reference_id", request.user_id.as_str()),
            ("metadata[user_id]", request.user_id.as_str()),
            ("metadata[plan]", request.plan.as_str()),
            ("success_url", request.success_url),
            ("cancel_url", request.cancel_url),
        ];
        match request.customer_id {
            Some(customer) => form.push(("customer", customer)),
            None => form.push(("customer_email", request.email)),
        }

        let response = self
            .client
            .post(self.url("checkout/sessions"))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Billing(format!("stripe request failed: {e}")))?;

        let session: CheckoutSession = parse(response).await?;
        info!("created checkout session {}", session.id);
        Ok(session)
    }

    #[instrument(skip(self))]
    pub async fn cancel_subscription(&self, subscription_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("subscriptions/{subscription_id}")))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| Error::Billing(format!("stripe request failed: {e}")))?;

        let _: serde_json::Value = parse(response).await?;
        info!("cancelled stripe subscription {subscription_id}");
        Ok(())
    }
}

async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Billing(format!(
            "stripe API error: status={status}, body={body}"
        )));
    }
    response
        .json()
        .await
        .map_err(|e| Error::Billing(format!("failed to parse stripe response: {e}")))
}

/// The parts of a Stripe webhook event the gateway acts on.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::{CheckoutRequest, StripeClient};
    use luna_common::{Error, Plan, UserId};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn checkout_posts_form_with_plan_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header("authorization", "Bearer sk_test"))
            .and(body_string_contains("metadata%5Bplan%5D=premium"))
            .and(body_string_contains("customer_email=alice%40example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_123",
                "url": "https://checkout.stripe.com/c/cs_123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = StripeClient::new("sk_test", server.uri());
        let user = UserId::from_raw("u1");
        let session = client
            .create_checkout_session(&CheckoutRequest {
                user_id: &user,
                email: "alice@example.com",
                customer_id: None,
                plan: Plan::Premium,
                price_id: "price_premium",
                success_url: "https://app.example.com/ok",
                cancel_url: "https://app.example.com/cancel",
            })
            .await
            .unwrap();

        assert_eq!(session.id, "cs_123");
        assert_eq!(session.url.as_deref(), Some("https://checkout.stripe.com/c/cs_123"));
    }

    #[tokio::test]
    async fn stripe_failures_are_billing_errors() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/subscriptions/sub_1"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such subscription"))
            .mount(&server)
            .await;

        let client = StripeClient::new("sk_test", server.uri());
        let err = client.cancel_subscription("sub_1").await.unwrap_err();
        assert!(matches!(err, Error::Billing(_)));
    }
}
