use pulldown_cmark::{html, Event, Options, Parser};

/// Renders assistant markdown to HTML for the Web UI.
///
/// Raw HTML in the source is not trusted: it is turned back into text so it
/// shows up escaped instead of being injected into the page.
pub fn render_markdown(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(source, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });

    let mut rendered = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut rendered, parser);
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_basic_formatting() {
        let html = render_markdown("**Dinosaurs** are *cool*!\n\n- T-Rex\n- Triceratops");
        assert!(html.contains("<strong>Dinosaurs</strong>"));
        assert!(html.contains("<em>cool</em>"));
        assert!(html.contains("<li>T-Rex</li>"));
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let html = render_markdown("Hi <script>alert(1)</script> there");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));

        let block = render_markdown("<div onclick=\"x()\">boo</div>\n");
        assert!(!block.contains("<div"));
    }

    #[test]
    fn test_tables_enabled() {
        let html = render_markdown("| Planet | Moons |\n|---|---|\n| Mars | 2 |\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>Mars</td>"));
    }
}
