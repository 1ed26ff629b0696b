//! Renders a secret as a throwaway JavaScript expression.
//!
//! Every call produces a differently shaped expression that evaluates to
//! the same string: each character is rebuilt from a random arithmetic
//! pair, statements are shuffled and padded with unused decoys.

use rand::seq::SliceRandom;
use rand::Rng;

const IDENT_HEAD: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_$";
const IDENT_TAIL: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_";

fn identifier<R: Rng>(rng: &mut R) -> String {
    let len = rng.random_range(5..10);
    let mut ident = String::with_capacity(len);
    ident.push(IDENT_HEAD[rng.random_range(0..IDENT_HEAD.len())] as char);
    for _ in 1..len {
        ident.push(IDENT_TAIL[rng.random_range(0..IDENT_TAIL.len())] as char);
    }
    ident
}

/// `a op b` evaluating to `code`.
fn char_code<R: Rng>(rng: &mut R, code: u32) -> String {
    match rng.random_range(0..3) {
        0 => {
            let a = rng.random_range(0..=code);
            format!("{}+{}", a, code - a)
        }
        1 => {
            let b = rng.random_range(1..1000);
            format!("{}-{}", code + b, b)
        }
        _ => {
            let key = rng.random_range(1..256);
            format!("{}^{}", code ^ key, key)
        }
    }
}

/// JavaScript expression evaluating to `secret`.
pub fn obfuscate(secret: &str) -> String {
    let mut rng = rand::rng();

    let array = identifier(&mut rng);
    let mut statements: Vec<String> = secret
        .chars()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "{}[{}]=String.fromCharCode({});",
                array,
                i,
                char_code(&mut rng, c as u32)
            )
        })
        .collect();

    let decoys = rng.random_range(2..6);
    for _ in 0..decoys {
        let mut name = identifier(&mut rng);
        while name == array {
            name = identifier(&mut rng);
        }
        let code = rng.random_range(48..91);
        statements.push(format!(
            "var {}=String.fromCharCode({});",
            name,
            char_code(&mut rng, code)
        ));
    }
    statements.shuffle(&mut rng);

    format!(
        "(function(){{var {}=[];{}return {}.join(\"\");}})()",
        array,
        statements.concat(),
        array
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use regex::Regex;

    /// Evaluate an expression produced by `obfuscate` without a JS engine.
    pub(crate) fn decode(js: &str) -> String {
        let assign =
            Regex::new(r"(\w+)\[(\d+)\]=String\.fromCharCode\((\d+)([+\-^])(\d+)\)").unwrap();

        let mut chars: Vec<(usize, char)> = assign
            .captures_iter(js)
            .map(|caps| {
                let index: usize = caps[2].parse().unwrap();
                let a: u32 = caps[3].parse().unwrap();
                let b: u32 = caps[5].parse().unwrap();
                let code = match &caps[4] {
                    "+" => a + b,
                    "-" => a - b,
                    _ => a ^ b,
                };
                (index, char::from_u32(code).unwrap())
            })
            .collect();
        chars.sort_by_key(|(i, _)| *i);
        chars.into_iter().map(|(_, c)| c).collect()
    }

    #[test]
    fn test_expression_decodes_to_secret() {
        for _ in 0..50 {
            assert_eq!(decode(&obfuscate("A1B2C3D")), "A1B2C3D");
        }
    }

    #[test]
    fn test_secret_never_appears_verbatim() {
        let js = obfuscate("SECRET7");
        assert!(!js.contains("SECRET7"));
        assert!(js.starts_with("(function(){"));
        assert!(js.ends_with("})()"));
    }

    #[test]
    fn test_each_render_differs() {
        let first = obfuscate("ABCDEFG");
        let differs = (0..10).any(|_| obfuscate("ABCDEFG") != first);
        assert!(differs);
    }
}
