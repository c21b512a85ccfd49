//! Context assembly and the answer instruction template.

use tandem_core::Scalar;
use tandem_vector::SearchHit;

/// Default upper bound on the context handed to the model, in characters.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 4000;

/// Rendered in place of the context when retrieval found nothing.
pub const EMPTY_CONTEXT: &str = "(no matching items)";

const ENTRY_SEPARATOR: &str = "\n\n";

/// System prompt for an answer over `context`.
pub fn system_prompt(context: &str) -> String {
    let context = if context.trim().is_empty() {
        EMPTY_CONTEXT
    } else {
        context
    };
    format!(
        "You are a helpful sales assistant for a car catalog.\n\
         Answer the customer's question using only the items listed in the context.\n\
         Quote prices and availability exactly as they appear in the context.\n\
         If no item in the context matches the question, say that you have no matching items.\n\
         Keep the answer short.\n\
         \n\
         Context:\n\
         {context}"
    )
}

/// Format a price as whole dollars with thousands separators, e.g.
/// `$20,000`. Fractional prices keep two decimals.
pub fn format_price(value: f64) -> String {
    let negative = value < 0.0;
    let cents = (value.abs() * 100.0).round() as u64;
    let (dollars, cents) = (cents / 100, cents % 100);

    let digits = dollars.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    if cents == 0 {
        format!("{sign}${grouped}")
    } else {
        format!("{sign}${grouped}.{cents:02}")
    }
}

/// Availability line for an `in_stock` flag.
pub fn availability(in_stock: bool) -> String {
    format!(
        "Availability: {}",
        if in_stock { "In stock" } else { "Out of stock" }
    )
}

/// One context entry: the stored chunk text followed by the current price
/// and availability from the hit's passthrough metadata.
pub fn render_hit(hit: &SearchHit) -> String {
    let mut segments = vec![hit.text.trim().to_string()];
    if let Some(price) = hit.metadata.passthrough.get("price").and_then(Scalar::as_f64) {
        segments.push(format!("Price: {}", format_price(price)));
    }
    if let Some(in_stock) = hit
        .metadata
        .passthrough
        .get("in_stock")
        .and_then(Scalar::as_bool)
    {
        segments.push(availability(in_stock));
    }
    segments.join(tandem_vector::text::SEGMENT_SEPARATOR)
}

/// Join rendered hits in rank order, stopping before the entry that would
/// push the context past `max_chars`. A first entry that alone exceeds the
/// bound is truncated.
pub fn build_context(hits: &[SearchHit], max_chars: usize) -> String {
    let mut context = String::new();
    let mut used = 0usize;

    for hit in hits {
        let entry = render_hit(hit);
        let separator = if context.is_empty() { 0 } else { ENTRY_SEPARATOR.len() };
        let len = entry.chars().count();

        if used + separator + len > max_chars {
            if context.is_empty() {
                context = entry.chars().take(max_chars).collect();
            }
            break;
        }
        if separator > 0 {
            context.push_str(ENTRY_SEPARATOR);
        }
        context.push_str(&entry);
        used += separator + len;
    }
    context
}
