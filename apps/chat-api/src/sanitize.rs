//! Markup stripping and entity escaping for untrusted text (pseudos, message bodies).

/// Elements whose inner text is discarded along with the tags themselves.
const DROPPED_CONTENT_TAGS: [&str; 5] = ["script", "style", "textarea", "option", "noscript"];

/// Strip every tag and attribute, escape `& < > " '`, then trim.
///
/// Total and deterministic: whitespace-only or markup-only input yields `""`.
pub fn sanitize(input: &str) -> String {
    let stripped = strip_tags(input);
    escape(&stripped).trim().to_string()
}

/// A markup construct found at the start of a slice beginning with `<`.
struct Markup {
    /// Byte length of the construct, including the closing `>`.
    len: usize,
    /// Set when the element's content must be skipped up to its closing tag.
    drop_content: Option<&'static str>,
}

fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('<') {
        out.push_str(&rest[..pos]);
        let candidate = &rest[pos..];

        match parse_markup(candidate) {
            Some(Markup {
                len,
                drop_content: Some(name),
            }) => rest = skip_past_closing_tag(&candidate[len..], name),
            Some(Markup { len, .. }) => rest = &candidate[len..],
            None => {
                // A bare `<` that does not open a tag is ordinary text.
                out.push('<');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Recognise a comment, declaration, processing instruction, or element tag.
/// `s` always starts with `<`.
fn parse_markup(s: &str) -> Option<Markup> {
    if let Some(body) = s.strip_prefix("<!--") {
        // Unterminated comments swallow the rest of the input.
        let len = body.find("-->").map(|i| 4 + i + 3).unwrap_or(s.len());
        return Some(Markup {
            len,
            drop_content: None,
        });
    }

    let bytes = s.as_bytes();
    let opens_tag = match bytes.get(1) {
        Some(b) if b.is_ascii_alphabetic() => true,
        Some(b'!') | Some(b'?') => true,
        Some(b'/') => bytes.get(2).is_some_and(|b| b.is_ascii_alphabetic()),
        _ => false,
    };
    if !opens_tag {
        return None;
    }

    let len = find_tag_end(bytes)? + 1;

    let name: String = s[1..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let self_closing = s[..len].ends_with("/>");
    let drop_content = if self_closing {
        None
    } else {
        DROPPED_CONTENT_TAGS.iter().copied().find(|tag| *tag == name)
    };

    Some(Markup { len, drop_content })
}

/// Index of the `>` closing the tag, ignoring any inside quoted attribute values.
fn find_tag_end(bytes: &[u8]) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate().skip(1) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(i),
            None => {}
        }
    }
    None
}

/// Return the text following `</name ...>`, or `""` if the element never closes.
fn skip_past_closing_tag<'a>(s: &'a str, name: &str) -> &'a str {
    // ASCII lowercasing keeps byte offsets identical.
    let lowered = s.to_ascii_lowercase();
    let needle = format!("</{name}");
    let Some(start) = lowered.find(&needle) else {
        return "";
    };
    match s[start..].find('>') {
        Some(end) => &s[start + end + 1..],
        None => "",
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
