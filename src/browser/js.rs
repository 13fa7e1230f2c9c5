//! JS snippets run against the live page.
//!
//! Each builder returns a self-contained IIFE; string arguments are embedded
//! as JSON literals so titles with quotes survive intact.

fn js_string(s: &str) -> String {
    serde_json::to_string(s).expect("string always serializes")
}

/// Scroll the list entry containing `title` into view by adjusting the
/// nearest scrollable ancestor. Returns true when a matching anchor exists.
pub fn scroll_into_view(title: &str) -> String {
    format!(
        r#"(() => {{
            const title = {title};
            const anchors = Array.from(document.querySelectorAll('a'));
            for (const el of anchors) {{
                if (!el || !(el.textContent || '').includes(title)) continue;
                let anc = el.parentElement;
                while (anc && anc !== document.body) {{
                    const style = window.getComputedStyle(anc);
                    const overflowY = (style.overflowY || style.overflow || '').toLowerCase();
                    if (overflowY === 'auto' || overflowY === 'scroll' || anc.scrollHeight > anc.clientHeight) {{
                        const offset = el.offsetTop - Math.floor(anc.clientHeight / 2);
                        anc.scrollTop = offset > 0 ? offset : 0;
                        return true;
                    }}
                    anc = anc.parentElement;
                }}
                el.scrollIntoView({{behavior: 'auto', block: 'center', inline: 'nearest'}});
                return true;
            }}
            return false;
        }})()"#,
        title = js_string(title),
    )
}

/// Click the anchor containing `title`, preferring currently visible ones.
/// Returns true when a click was dispatched.
pub fn click_anchor(title: &str) -> String {
    format!(
        r#"(() => {{
            const title = {title};
            const visible = el => {{
                if (!el.offsetParent) return false;
                const r = el.getBoundingClientRect();
                return r.width > 0 && r.height > 0;
            }};
            const anchors = Array.from(document.querySelectorAll('a'))
                .filter(el => (el.textContent || '').includes(title));
            for (const el of anchors.filter(visible)) {{
                el.scrollIntoView({{block: 'center'}});
                el.click();
                return true;
            }}
            if (anchors.length) {{
                anchors[0].scrollIntoView({{block: 'center'}});
                anchors[0].click();
                return true;
            }}
            return false;
        }})()"#,
        title = js_string(title),
    )
}

pub fn page_title() -> &'static str {
    "document.title"
}

pub fn body_text() -> &'static str {
    "document.body ? document.body.innerText : ''"
}

/// Value of the hidden ASIN field the notebook keeps for the open book.
pub fn hidden_asin() -> &'static str {
    r#"(() => {
        const el = document.querySelector('#kp-notebook-annotations-asin');
        return el ? (el.value || null) : null;
    })()"#
}

pub fn highlight_count() -> &'static str {
    r#"document.querySelectorAll('div.kp-notebook-annotation-container .kp-notebook-highlight, .kp-notebook-highlight').length"#
}

/// Scroll the library list's scrollable ancestor (or the window) to the bottom.
pub fn library_scroll_to_bottom() -> &'static str {
    r#"(() => {
        const list = document.querySelector('ul#cover');
        let scroller = null;
        let cur = list;
        while (cur && cur !== document.body) {
            if (cur.scrollHeight > cur.clientHeight) { scroller = cur; break; }
            cur = cur.parentElement;
        }
        if (scroller) {
            scroller.scrollTo({top: scroller.scrollHeight, behavior: 'auto'});
        } else {
            window.scrollTo(0, document.body.scrollHeight);
        }
        return true;
    })()"#
}

/// Number of library entries that have rendered a non-empty title.
pub fn library_item_count() -> &'static str {
    r#"Array.from(document.querySelectorAll('ul#cover li[role="listitem"]')).filter(li => {
        const titleNode = li.querySelector('div[id^="title-"] p');
        return titleNode && titleNode.textContent.trim().length > 0;
    }).length"#
}

/// Unique class strings of div elements, for selector spelunking.
pub fn div_classes(limit: usize) -> String {
    format!(
        r#"(() => {{
            const classes = Array.from(document.querySelectorAll('div'))
                .map(e => e.className)
                .filter(c => c && typeof c === 'string');
            return Array.from(new Set(classes)).sort().slice(0, {limit});
        }})()"#
    )
}

/// Non-empty anchor texts, for selector spelunking.
pub fn anchor_texts(limit: usize) -> String {
    format!(
        r#"(() => Array.from(document.querySelectorAll('a'))
            .map(e => (e.textContent || '').trim())
            .filter(t => t)
            .slice(0, {limit}))()"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_are_embedded_as_json_literals() {
        let script = click_anchor(r#"It's "quoted" 本"#);
        assert!(script.contains(r#""It's \"quoted\" 本""#));
        assert!(!script.contains("{title}"));
    }

    #[test]
    fn builders_produce_iifes() {
        assert!(scroll_into_view("x").starts_with("(() =>"));
        assert!(div_classes(50).contains(".slice(0, 50)"));
        assert!(anchor_texts(30).contains(".slice(0, 30)"));
    }
}
