use luna_common::{Error, Result};
use ring::hmac;

/// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`) against
/// the raw request body.
///
/// The signed payload is `"{t}.{body}"` under HMAC-SHA256. The timestamp must
/// be within `tolerance_secs` of `now`.
pub fn verify_stripe_signature(
    header: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<()> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = Some(value),
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| Error::Unauthorized("webhook signature missing timestamp".into()))?;
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| Error::Unauthorized("webhook signature has invalid timestamp".into()))?;
    if signatures.is_empty() {
        return Err(Error::Unauthorized(
            "webhook signature missing v1 entries".into(),
        ));
    }
    if now.abs_diff(ts) > tolerance_secs.unsigned_abs() {
        return Err(Error::Unauthorized(
            "webhook timestamp outside tolerance".into(),
        ));
    }

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let mut signed = Vec::with_capacity(timestamp.len() + 1 + payload.len());
    signed.extend_from_slice(timestamp.as_bytes());
    signed.push(b'.');
    signed.extend_from_slice(payload);

    if signatures
        .iter()
        .any(|sig| hmac::verify(&key, &signed, sig).is_ok())
    {
        Ok(())
    } else {
        Err(Error::Unauthorized("webhook signature mismatch".into()))
    }
}

/// Produce a header value in Stripe's format. Used by tests and local tooling
/// that replays events against the webhook endpoint.
pub fn sign_stripe_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let mut ctx = hmac::Context::with_key(&key);
    ctx.update(timestamp.to_string().as_bytes());
    ctx.update(b".");
    ctx.update(payload);
    format!("t={timestamp},v1={}", hex::encode(ctx.sign().as_ref()))
}

#[cfg(test)]
mod tests {
    use super::{sign_stripe_payload, verify_stripe_signature};

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"type":"checkout.session.completed"}"#;

    #[test]
    fn accepts_valid_signature() {
        let header = sign_stripe_payload(BODY, SECRET, 1_700_000_000);
        verify_stripe_signature(&header, BODY, SECRET, 300, 1_700_000_100).unwrap();
    }

    #[test]
    fn accepts_when_any_v1_matches() {
        let valid = sign_stripe_payload(BODY, SECRET, 1_700_000_000);
        let sig = valid.split("v1=").nth(1).unwrap();
        let header = format!("t=1700000000,v1=deadbeef,v1={sig}");
        verify_stripe_signature(&header, BODY, SECRET, 300, 1_700_000_000).unwrap();
    }

    #[test]
    fn rejects_tampered_body_and_wrong_secret() {
        let header = sign_stripe_payload(BODY, SECRET, 1_700_000_000);
        assert!(verify_stripe_signature(&header, b"{}", SECRET, 300, 1_700_000_000).is_err());
        assert!(verify_stripe_signature(&header, BODY, "whsec_other", 300, 1_700_000_000).is_err());
    }

    #[test]
    fn rejects_stale_and_malformed_headers() {
        let header = sign_stripe_payload(BODY, SECRET, 1_700_000_000);
        assert!(verify_stripe_signature(&header, BODY, SECRET, 300, 1_700_000_301).is_err());
        assert!(verify_stripe_signature("v1=abcd", BODY, SECRET, 300, 0).is_err());
        assert!(verify_stripe_signature("t=1", BODY, SECRET, 300, 1).is_err());
        assert!(
            verify_stripe_signature("t=-9223372036854775808,v1=00", b"{}", SECRET, 300, 1_700_000_000)
                .is_err()
        );
        assert!(
            verify_stripe_signature("t=9223372036854775807,v1=00", b"{}", SECRET, 300, -1_700_000_000)
                .is_err()
        );
    }
}
