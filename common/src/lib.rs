#[macro_use]
pub mod macros;
pub mod key_index_vec;
pub mod log_setup;

pub const EPSILON: f64 = 1e-10;

pub fn is_debug() -> bool {
    cfg!(debug_assertions)
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPSILON
}

#[cfg(test)]
mod tests {
    use super::approx_eq;

    id_type!(TestId);

    #[test]
    fn id_type_roundtrip() -> anyhow::Result<()> {
        let id = TestId::unique();
        assert!(!id.is_nil());
        assert!(TestId::default().is_nil());

        let parsed: TestId = id.to_string().parse()?;
        assert_eq!(parsed, id);

        let from_str: TestId = "5f7dca60-37c4-4f3a-81c5-0d3d9a30c1f8".into();
        assert_eq!(
            from_str.as_u128(),
            0x5f7dca60_37c4_4f3a_81c5_0d3d9a30c1f8_u128
        );

        Ok(())
    }

    #[test]
    fn approx_eq_tolerates_rounding() {
        assert!(approx_eq(0.1 + 0.2, 0.3));
        assert!(!approx_eq(0.1, 0.2));
    }
}
