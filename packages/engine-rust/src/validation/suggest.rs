//! Close-match suggestions for misspelled property names and option values.

/// Common names callers use for standard CRM properties.
fn aliases(name: &str) -> &'static [&'static str] {
    match name {
        "stage" => &["hs_pipeline_stage", "dealstage"],
        "status" => &["hs_pipeline_stage", "hs_ticket_priority"],
        "pipeline_stage" | "ticket_stage" => &["hs_pipeline_stage"],
        "deal_stage" => &["dealstage"],
        "priority" => &["hs_ticket_priority"],
        "owner" | "assigned_to" => &["hubspot_owner_id"],
        "title" => &["subject", "dealname", "hs_task_subject"],
        "description" => &["content", "hs_task_body"],
        "name" => &["dealname", "firstname", "lastname"],
        "email_address" => &["email"],
        "phone_number" => &["phone"],
        "company_name" => &["company"],
        _ => &[],
    }
}

/// Number of characters in matching blocks (Ratcliff/Obershelp).
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (mut best_a, mut best_b, mut best_len) = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        let mut cur = vec![0usize; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            if ca == cb {
                cur[j + 1] = prev[j] + 1;
                if cur[j + 1] > best_len {
                    best_len = cur[j + 1];
                    best_a = i + 1 - best_len;
                    best_b = j + 1 - best_len;
                }
            }
        }
        prev = cur;
    }

    if best_len == 0 {
        return 0;
    }
    best_len
        + matching_chars(&a[..best_a], &b[..best_b])
        + matching_chars(&a[best_a + best_len..], &b[best_b + best_len..])
}

/// Similarity in `[0, 1]`: twice the matched characters over the total length.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = 2.0 * matching_chars(&a, &b) as f64 / total as f64;
    ratio
}

/// Up to `limit` candidates scoring at least `cutoff`, best first.
#[must_use]
pub fn close_matches<'a, I>(word: &str, candidates: I, limit: usize, cutoff: f64) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut scored: Vec<(f64, &String)> = candidates
        .into_iter()
        .map(|candidate| (similarity(word, candidate), candidate))
        .filter(|(score, _)| *score >= cutoff)
        .collect();
    scored.sort_by(|(sa, a), (sb, b)| sb.total_cmp(sa).then_with(|| a.cmp(b)));
    scored
        .into_iter()
        .take(limit)
        .map(|(_, candidate)| candidate.clone())
        .collect()
}

/// Suggestions for an unknown property: close matches, then known aliases.
#[must_use]
pub fn property_suggestions(field: &str, known: &[String]) -> Vec<String> {
    const LIMIT: usize = 3;

    let mut suggestions = close_matches(field, known, LIMIT, 0.6);
    let lowered = field.to_lowercase();
    for alias in aliases(&lowered) {
        if known.iter().any(|k| k == alias) && !suggestions.iter().any(|s| s == alias) {
            suggestions.push((*alias).to_string());
        }
    }
    suggestions.truncate(LIMIT);
    suggestions
}
