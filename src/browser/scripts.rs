//! JavaScript evaluated inside the application page
//!
//! Scripts that take arguments are templates: arguments are injected as JSON
//! literals, never by string concatenation of raw user text.

use serde_json::Value;

/// Collects every rendered property card as `{sourceId, text, tags}`
pub const COLLECT_CARDS: &str = r#"
(() => {
    const selectors = [
        "div[data-testid='property-card']",
        "div.property-card",
        "div.card-property",
        ".deal-scroll [data-id]"
    ];
    let nodes = [];
    for (const sel of selectors) {
        nodes = Array.from(document.querySelectorAll(sel));
        if (nodes.length > 0) break;
    }
    return nodes.map((el) => {
        const id = el.getAttribute('data-id')
            || el.getAttribute('data-property-id')
            || el.getAttribute('data-lead-id')
            || null;
        const tags = Array.from(el.querySelectorAll("[class*='chip'], [class*='tag'], [class*='badge']"))
            .map((c) => (c.innerText || '').trim())
            .filter((t) => t.length > 0);
        return { sourceId: id, text: (el.innerText || '').trim(), tags };
    });
})()
"#;

/// Scrolls the result list container (or the window) by one viewport
pub const SCROLL_RESULTS: &str = r#"
(() => {
    const box = document.querySelector('.deal-scroll')
        || document.querySelector("[data-testid='results-list']");
    if (box) {
        box.scrollTop = box.scrollHeight;
        return true;
    }
    window.scrollTo(0, document.body.scrollHeight);
    return false;
})()
"#;

/// Visible login error text, or null
pub const LOGIN_ERROR_TEXT: &str = r#"
(() => {
    const nodes = document.querySelectorAll("[role='alert'], .error, [class*='error'], [class*='Error']");
    for (const el of nodes) {
        const text = (el.innerText || '').trim();
        if (text.length > 0 && el.offsetParent !== null) return text;
    }
    return null;
})()
"#;

/// Clears the focused search box before typing
pub const CLEAR_SEARCH_INPUT: &str = r#"
(() => {
    const input = document.activeElement;
    if (input && 'value' in input) {
        input.value = '';
        input.dispatchEvent(new Event('input', { bubbles: true }));
        return true;
    }
    return false;
})()
"#;

/// Text of the first visible card detail view, or null
pub const DETAIL_TEXT: &str = r#"
(() => {
    const selectors = [
        ".property-details",
        "[data-testid='property-modal']",
        ".ReactModal__Content",
        ".modal.open",
        "[role='dialog']"
    ];
    for (const sel of selectors) {
        for (const el of document.querySelectorAll(sel)) {
            const text = (el.innerText || '').trim();
            if (text.length > 0 && el.offsetParent !== null) return text;
        }
    }
    return null;
})()
"#;

/// Closes the detail view by its close button, or with Escape
pub const CLOSE_DETAILS: &str = r#"
(() => {
    const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
    const buttons = Array.from(document.querySelectorAll(
        "button[aria-label*='close' i], .modal button.close, .ReactModal__Content button.close, [role='dialog'] button"
    )).filter((el) => el.offsetParent !== null);
    const close = buttons.find((el) => (el.getAttribute('aria-label') || '').toLowerCase().includes('close'))
        || buttons.find((el) => el.classList.contains('close'))
        || buttons.find((el) => norm(el.innerText) === 'close');
    if (close) {
        close.click();
        return true;
    }
    document.dispatchEvent(new KeyboardEvent('keydown', { key: 'Escape', bubbles: true }));
    return false;
})()
"#;

/// Whether a visible element matching `tags` contains `text`
pub fn has_text(text: &str, tags: &str) -> String {
    format!(
        r#"
((target, tags) => {{
    const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
    const wanted = norm(target);
    return Array.from(document.querySelectorAll(tags))
        .some((el) => el.offsetParent !== null && norm(el.innerText).includes(wanted));
}})({}, {})
"#,
        Value::from(text),
        Value::from(tags)
    )
}

/// Click the result card with `source_id` (or, failing that, the one showing
/// `address`); returns whether a card was clicked
pub fn open_card(source_id: &str, address: &str) -> String {
    format!(
        r#"
((id, address) => {{
    const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
    const cards = Array.from(document.querySelectorAll(
        "div[data-testid='property-card'], div.property-card, div.card-property, .deal-scroll [data-id]"
    ));
    const byId = cards.find((el) => ['data-id', 'data-property-id', 'data-lead-id']
        .some((attr) => el.getAttribute(attr) === id));
    const card = byId || cards.find((el) => norm(el.innerText).includes(norm(address)));
    if (!card) return false;
    card.scrollIntoView({{ block: 'center' }});
    card.click();
    return true;
}})({}, {})
"#,
        Value::from(source_id),
        Value::from(address)
    )
}

/// Click the smallest visible element whose text matches; returns whether
/// anything was clicked
pub fn click_text(text: &str, tags: &str) -> String {
    format!(
        r#"
((target, tags) => {{
    const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
    const wanted = norm(target);
    const matches = Array.from(document.querySelectorAll(tags))
        .filter((el) => el.offsetParent !== null && norm(el.innerText).includes(wanted))
        .sort((a, b) => norm(a.innerText).length - norm(b.innerText).length);
    if (matches.length === 0) return false;
    matches[0].scrollIntoView({{ block: 'center' }});
    matches[0].click();
    return true;
}})({}, {})
"#,
        Value::from(text),
        Value::from(tags)
    )
}

/// Set one filter control by its visible label
///
/// Booleans click the control (unless a checkbox is already in the wanted
/// state), strings fill the nearest input or pick the matching option,
/// arrays click each option. Returns false when no control matches or any
/// requested option is missing.
pub fn apply_filter(name: &str, value: &Value) -> String {
    format!(
        r#"
((name, value) => {{
    const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
    const wanted = norm(name);
    const candidates = Array.from(document.querySelectorAll("button, label, [role='button'], [role='checkbox'], [role='switch']"))
        .filter((el) => el.offsetParent !== null && norm(el.innerText).includes(wanted))
        .sort((a, b) => norm(a.innerText).length - norm(b.innerText).length);
    if (candidates.length === 0) return false;
    const control = candidates[0];
    control.scrollIntoView({{ block: 'center' }});

    const clickOption = (text) => {{
        const t = norm(text);
        const option = Array.from(document.querySelectorAll("[role='option'], li, label, button"))
            .filter((el) => el.offsetParent !== null && norm(el.innerText) === t)[0];
        if (option) option.click();
        return Boolean(option);
    }};

    if (typeof value === 'boolean') {{
        const box = control.querySelector("input[type='checkbox']");
        if (box && box.checked === value) return true;
        control.click();
        return true;
    }}
    if (Array.isArray(value)) {{
        control.click();
        return value.length > 0 && value.every(clickOption);
    }}
    const scope = control.closest('div') || control.parentElement;
    const input = scope ? scope.querySelector('input') : null;
    if (input) {{
        const setter = Object.getOwnPropertyDescriptor(HTMLInputElement.prototype, 'value').set;
        setter.call(input, String(value));
        input.dispatchEvent(new Event('input', {{ bubbles: true }}));
        input.dispatchEvent(new Event('change', {{ bubbles: true }}));
        return true;
    }}
    control.click();
    return clickOption(String(value));
}})({}, {})
"#,
        Value::from(name),
        value
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_are_json_escaped() {
        let script = click_text("O'Brien \"Trust\"", "button");
        assert!(script.contains(r#""O'Brien \"Trust\"""#));

        let script = apply_filter("Year Built", &Value::from("<=2005"));
        assert!(script.contains(r#"("Year Built", "<=2005")"#));

        let script = open_card("dm-1", "12 \"Oak\" St");
        assert!(script.contains(r#"("dm-1", "12 \"Oak\" St")"#));
    }

    #[test]
    fn test_missing_filter_option_is_reported() {
        let script = apply_filter("Property Type", &Value::from(vec!["Duplex"]));
        assert!(script.contains("return value.length > 0 && value.every(clickOption);"));
        assert!(script.contains("return clickOption(String(value));"));
        assert!(!script.contains("forEach(clickOption)"));

        // Only the boolean and input branches report success without an option
        assert_eq!(script.matches("return true;").count(), 3);
    }
}
