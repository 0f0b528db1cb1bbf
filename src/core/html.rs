// src/core/html.rs
// Tolerant, case-insensitive scanning over raw HTML. No DOM.

pub fn to_lower(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii() {
                c.to_ascii_lowercase()
            } else {
                c
            }
        })
        .collect()
}

/// Next `open ... close` block at or after `from`, as byte offsets into `s`.
/// Offsets are valid for `s` because lowering only touches ASCII.
pub fn next_tag_block_ci(s: &str, o: &str, c: &str, from: usize) -> Option<(usize, usize)> {
    let lc = to_lower(s);
    let ol = to_lower(o);
    let cl = to_lower(c);
    let start = lc.get(from..)?.find(&ol)? + from;
    let open_end = s[start..].find('>')? + start + 1;
    let end_rel = lc[open_end..].find(&cl)?;
    let end = open_end + end_rel + c.len();
    Some((start, end))
}

/// All `open ... close` blocks in order.
pub fn tag_blocks_ci<'a>(s: &'a str, o: &str, c: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while let Some((bs, be)) = next_tag_block_ci(s, o, c, pos) {
        out.push(&s[bs..be]);
        pos = be;
    }
    out
}

/// First `<tag ...>` block whose opening tag's class attribute contains `class_sub`.
pub fn find_block_with_class<'a>(s: &'a str, tag: &str, class_sub: &str) -> Option<&'a str> {
    let open = join!("<", tag);
    let close = join!("</", tag, ">");
    let mut pos = 0usize;
    while let Some((bs, be)) = next_tag_block_ci(s, &open, &close, pos) {
        let block = &s[bs..be];
        let class = attr_value(open_tag(block), "class").unwrap_or_default();
        if to_lower(&class).contains(&to_lower(class_sub)) {
            return Some(block);
        }
        pos = be;
    }
    None
}

/// The `<...>` opening tag of a block.
pub fn open_tag(block: &str) -> &str {
    match block.find('>') {
        Some(i) => &block[..=i],
        None => block,
    }
}

/// Attribute value from an opening tag; quoted or bare.
pub fn attr_value(tag: &str, name: &str) -> Option<String> {
    let lc = to_lower(tag);
    let needle = join!(&to_lower(name), "=");
    let mut from = 0usize;
    while let Some(rel) = lc[from..].find(&needle) {
        let at = from + rel;
        // must be a whole attribute name
        let boundary = at == 0 || lc.as_bytes()[at - 1].is_ascii_whitespace();
        let vstart = at + needle.len();
        if boundary {
            let rest = &tag[vstart..];
            return match rest.chars().next() {
                Some(q @ ('"' | '\'')) => rest[1..].find(q).map(|e| s!(&rest[1..1 + e])),
                Some(_) => {
                    let end = rest.find(|c: char| c.is_whitespace() || c == '>').unwrap_or(rest.len());
                    Some(s!(&rest[..end]))
                }
                None => None,
            };
        }
        from = vstart;
    }
    None
}

pub fn inner_after_open_tag(block: &str) -> String {
    if let Some(oe) = block.find('>') {
        if let Some(cs) = block.rfind('<') {
            if cs > oe {
                return block[oe + 1..cs].to_string();
            }
        }
    }
    s!()
}

pub fn strip_tags<S: AsRef<str>>(s: S) -> String {
    let s = s.as_ref();

    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;

    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    super::sanitize::normalize_ws(&out)
}

/// Text content of one cell block: entities decoded, tags stripped, spaces collapsed.
pub fn cell_text(block: &str) -> String {
    strip_tags(super::sanitize::normalize_entities(&inner_after_open_tag(block)))
}
