//! Strict markup stripping for submitted field values.
//!
//! Everything that looks like a tag is removed and `<script>`/`<style>`
//! elements lose their content as well. The output is plain text: escaping
//! for HTML output is left to the mail template.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SCRIPT_OR_STYLE: Regex =
        Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
            .expect("static pattern");
    static ref COMMENT: Regex = Regex::new(r"(?s)<!--.*?-->").expect("static pattern");
    static ref TAG: Regex = Regex::new(r"(?s)</?[a-zA-Z!][^>]*>").expect("static pattern");
}

pub fn sanitize(value: &str) -> String {
    if !value.contains('<') {
        return value.to_string();
    }
    let text = SCRIPT_OR_STYLE.replace_all(value, "");
    let text = COMMENT.replace_all(&text, "");
    TAG.replace_all(&text, "").into_owned()
}
