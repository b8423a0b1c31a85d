//! Current local date and time components.

use chrono::Local;

use super::Procedure;

pub(super) fn procedures() -> Vec<Procedure> {
    [
        ("yyyy", "%Y"),
        ("yy", "%y"),
        ("mm", "%m"),
        ("dd", "%d"),
        ("hour", "%H"),
        ("minute", "%M"),
        ("second", "%S"),
    ]
    .into_iter()
    .map(|(name, format)| {
        Procedure::new(name, 0, Some(0), move |_| {
            Ok(Local::now().format(format).to_string())
        })
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use crate::procedures::ProcedureRegistry;

    #[test]
    fn test_components_are_zero_padded() {
        let registry = ProcedureRegistry::with_standard();
        let year = registry.call("yyyy", &[]).unwrap();
        assert_eq!(year.len(), 4);
        assert!(year.ends_with(&registry.call("yy", &[]).unwrap()));
        for name in ["mm", "dd", "hour", "minute", "second"] {
            let value = registry.call(name, &[]).unwrap();
            assert_eq!(value.len(), 2, "{name} = {value}");
            assert!(value.chars().all(|c| c.is_ascii_digit()));
        }
        assert!(registry.call("yyyy", &["x".into()]).is_err());
    }
}
