//! String procedures.

use super::Procedure;

pub(super) fn procedures() -> Vec<Procedure> {
    vec![
        Procedure::new("camelcasetospaced", 1, Some(1), |args| {
            Ok(camel_case_to_spaced(&args[0]))
        }),
        Procedure::new("upper", 1, Some(1), |args| Ok(args[0].to_uppercase())),
        Procedure::new("lower", 1, Some(1), |args| Ok(args[0].to_lowercase())),
        Procedure::new("replace", 3, Some(3), |args| {
            Ok(args[0].replace(args[1].as_str(), &args[2]))
        }),
    ]
}

/// `myShotName` becomes `My Shot Name`.
fn camel_case_to_spaced(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 4);
    let mut prev: Option<char> = None;
    for c in text.chars() {
        match prev {
            None => out.extend(c.to_uppercase()),
            Some(p) => {
                if c.is_uppercase() && (p.is_lowercase() || p.is_ascii_digit()) {
                    out.push(' ');
                }
                out.push(c);
            }
        }
        prev = Some(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case_to_spaced() {
        assert_eq!(camel_case_to_spaced("myShotName"), "My Shot Name");
        assert_eq!(camel_case_to_spaced("plateV2Denoise"), "Plate V2 Denoise");
        assert_eq!(camel_case_to_spaced("EXRFile"), "EXRFile");
        assert_eq!(camel_case_to_spaced(""), "");
    }
}
