/// Split `text` into chunks of at most `limit` characters.
///
/// Prefers breaking after a newline; falls back to a hard cut when a single
/// line is longer than the limit. Empty input yields no chunks.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut out = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        if rest.chars().count() <= limit {
            // Telegram refuses blank messages.
            if !rest.trim().is_empty() {
                out.push(rest.to_string());
            }
            break;
        }

        // Byte offset just past the `limit`-th char.
        let hard_end = rest
            .char_indices()
            .nth(limit)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());

        // A newline right at the limit still counts as a line boundary.
        let window_end = if rest[hard_end..].starts_with('\n') {
            hard_end + 1
        } else {
            hard_end
        };
        let cut = match rest[..window_end].rfind('\n') {
            Some(nl) if nl > 0 => nl + 1,
            _ => hard_end,
        };

        let (head, tail) = rest.split_at(cut);
        let head = head.trim_end_matches('\n');
        if !head.trim().is_empty() {
            out.push(head.to_string());
        }
        rest = tail;
    }

    out
}
