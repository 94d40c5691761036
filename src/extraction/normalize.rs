/// Canonicalize text before any matching.
///
/// Full-width digits become ASCII digits, exotic spaces become a plain space and dash
/// variants become `-`. Every other character passes through unchanged, so the function
/// is total and idempotent.
pub fn normalize(text: &str) -> String {
    text.chars().map(normalize_char).collect()
}

fn normalize_char(c: char) -> char {
    match c {
        '０'..='９' => {
            let offset = c as u32 - '０' as u32;
            char::from_digit(offset, 10).unwrap_or(c)
        }
        '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\u{3000}' => ' ',
        '\u{2010}'..='\u{2015}' | '\u{2212}' | '\u{FF0D}' => '-',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_full_width_digits() {
        assert_eq!(normalize("验证码：４８２９１３"), "验证码：482913");
    }

    #[test]
    fn keeps_plain_text_unchanged() {
        let text = "Your verification code is 482913, valid for 10 minutes";
        assert_eq!(normalize(text), text);
    }

    #[test]
    fn unifies_spaces_and_dashes() {
        assert_eq!(normalize("code\u{00A0}12\u{2013}34\u{3000}ok"), "code 12-34 ok");
        assert_eq!(normalize("Ａ－１"), "Ａ-1");
    }

    #[test]
    fn is_idempotent() {
        let samples = [
            "",
            "验证码：４８２９１３",
            "code\u{00A0}\u{3000}—\u{2212}１２",
            "plain ascii 123",
            "认证 コード 인증 ０９８７",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {sample:?}");
        }
    }
}
