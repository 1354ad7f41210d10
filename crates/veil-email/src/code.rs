use rand::Rng;

/// Generate a 6-digit verification code. Uniform over 000000-999999,
/// leading zeros preserved.
pub fn generate_verify_code() -> String {
    let mut rng = rand::rng();
    let code: u32 = rng.random_range(0..1_000_000);
    format!("{:06}", code)
}
