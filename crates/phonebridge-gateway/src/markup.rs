//! Call-control markup returned to the telephony platform's voice webhook.

use phonebridge_media::speech::optimize_punctuation;

const XML_PROLOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Voice and language for the platform's own `<Say>` verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SayOptions {
    pub voice: String,
    pub language: String,
}

impl Default for SayOptions {
    fn default() -> Self {
        Self {
            voice: "woman".into(),
            language: "fr-FR".into(),
        }
    }
}

/// Markup that optionally speaks a greeting and then opens a media stream.
pub fn build_stream_markup(stream_url: &str, greeting: Option<&str>) -> String {
    build_stream_markup_with(stream_url, greeting, &SayOptions::default())
}

pub fn build_stream_markup_with(stream_url: &str, greeting: Option<&str>, say: &SayOptions) -> String {
    let mut out = String::from(XML_PROLOG);
    out.push_str("<Response>");
    if let Some(text) = greeting.filter(|g| !g.trim().is_empty()) {
        push_say(&mut out, &optimize_punctuation(text), say);
    }
    out.push_str("<Connect><Stream url=\"");
    out.push_str(&escape_xml(stream_url));
    out.push_str("\"/></Connect></Response>");
    out
}

/// Markup that apologizes and hangs up.
pub fn build_error_markup(message: &str, say: &SayOptions) -> String {
    let mut out = String::from(XML_PROLOG);
    out.push_str("<Response>");
    push_say(&mut out, message, say);
    out.push_str("<Hangup/></Response>");
    out
}

fn push_say(out: &mut String, text: &str, say: &SayOptions) {
    out.push_str(&format!(
        "<Say voice=\"{}\" language=\"{}\">{}</Say>",
        escape_xml(&say.voice),
        escape_xml(&say.language),
        escape_xml(text)
    ));
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_markup_without_greeting() {
        let xml = build_stream_markup("wss://calls.example.com/media-stream", None);
        assert_eq!(
            xml,
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<Response><Connect><Stream url="wss://calls.example.com/media-stream"/></Connect></Response>"#
            )
        );
    }

    #[test]
    fn test_stream_markup_with_greeting() {
        let xml = build_stream_markup("wss://h/s", Some("Bonjour,bienvenue"));
        assert!(xml.contains(
            r#"<Say voice="woman" language="fr-FR">Bonjour, bienvenue.</Say><Connect>"#
        ));
        // Blank greetings are skipped.
        assert!(!build_stream_markup("wss://h/s", Some("   ")).contains("<Say"));
    }

    #[test]
    fn test_values_are_escaped() {
        let say = SayOptions {
            voice: "Polly.Léa".into(),
            language: "fr-FR".into(),
        };
        let xml = build_stream_markup_with("wss://h/s?a=1&b=\"2\"", Some("Tom & Jerry <3"), &say);
        assert!(xml.contains(r#"url="wss://h/s?a=1&amp;b=&quot;2&quot;""#));
        assert!(xml.contains("Tom &amp; Jerry &lt;3.</Say>"));
        assert!(xml.contains(r#"voice="Polly.Léa""#));
    }

    #[test]
    fn test_error_markup_hangs_up() {
        let xml = build_error_markup("Une erreur est survenue.", &SayOptions::default());
        assert!(xml.ends_with(
            r#"<Say voice="woman" language="fr-FR">Une erreur est survenue.</Say><Hangup/></Response>"#
        ));
    }
}
