use hmac::{Hmac, Mac};
use sha2::Sha256;

/// key: payment-signature -> provider digest primitive
///
/// Razorpay signs a completed checkout by HMAC-SHA256ing
/// `"<order_id>|<payment_id>"` with the key secret and rendering the digest
/// as lowercase hex. This is the only trust gate in the payment flow.
pub fn expected_signature(order_id: &str, payment_id: &str, secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can use any key length");
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Exact string comparison against the expected digest. No case folding: a
/// mixed-case or empty candidate is simply unequal, never an error.
pub fn verify(order_id: &str, payment_id: &str, candidate: &str, secret: &str) -> bool {
    expected_signature(order_id, payment_id, secret) == candidate
}
