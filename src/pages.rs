use super::sitemap::{model_path, DIFF_PATH, ROOT_PATH};

const SITE_NAME: &str = "Semantic Models";

/// SEO metadata injected into a page shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMeta {
    pub title: String,
    pub description: String,
    pub canonical_path: String,
}

impl PageMeta {
    pub fn home() -> Self {
        Self {
            title: format!("{} catalog", SITE_NAME),
            description: "Browse semantic data models and their released versions.".to_string(),
            canonical_path: ROOT_PATH.to_string(),
        }
    }

    pub fn diff() -> Self {
        Self {
            title: format!("Compare versions | {}", SITE_NAME),
            description: "Compare two versions of a semantic data model side by side."
                .to_string(),
            canonical_path: DIFF_PATH.to_string(),
        }
    }

    pub fn model(model: &str) -> Self {
        Self {
            title: format!("{} | {}", model, SITE_NAME),
            description: format!("Versions and documentation of the {} semantic model.", model),
            canonical_path: model_path(model, None),
        }
    }

    pub fn version(model: &str, version: &str) -> Self {
        Self {
            title: format!("{} {} | {}", model, version, SITE_NAME),
            description: format!(
                "Documentation of version {} of the {} semantic model.",
                version, model
            ),
            canonical_path: model_path(model, Some(version)),
        }
    }
}

/// Escapes text for use in HTML or XML content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Puts `meta` into an HTML shell: replaces its `<title>` and adds
/// description, canonical and Open Graph tags to the head.
pub fn render(shell: &str, meta: &PageMeta, base: &str) -> String {
    let title = escape_html(&meta.title);
    let description = escape_html(&meta.description);
    let canonical = escape_html(&format!("{}{}", base, meta.canonical_path));

    let mut head = format!(
        "<meta name=\"description\" content=\"{description}\">\n\
         <link rel=\"canonical\" href=\"{canonical}\">\n\
         <meta property=\"og:type\" content=\"website\">\n\
         <meta property=\"og:title\" content=\"{title}\">\n\
         <meta property=\"og:description\" content=\"{description}\">\n\
         <meta property=\"og:url\" content=\"{canonical}\">\n"
    );

    let mut page = shell.to_string();
    match find_element(&page, "<title", "</title>") {
        Some((start, end)) => page.replace_range(start..end, &format!("<title>{}</title>", title)),
        None => head.insert_str(0, &format!("<title>{}</title>\n", title)),
    }

    match find_ascii_ci(&page, "</head>") {
        Some(at) => page.insert_str(at, &head),
        None => page.insert_str(0, &head),
    }
    page
}

/// Byte range of the first `open ... close` element, case-insensitively.
fn find_element(html: &str, open: &str, close: &str) -> Option<(usize, usize)> {
    let start = find_ascii_ci(html, open)?;
    let end = find_ascii_ci(&html[start..], close)? + start + close.len();
    Some((start, end))
}

fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}
