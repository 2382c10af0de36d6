//! Server-rendered HTML pages.
//!
//! Markup is intentionally plain; styling belongs to whatever fronts the
//! service. Every interpolated filename goes through [`escape_html`].

use relume_core::upload::ALLOWED_EXTENSIONS;

/// Escape text for use in HTML element content and quoted attributes.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n{body}</body>\n</html>\n",
        title = escape_html(title),
    )
}

fn figure(caption: &str, src: &str) -> String {
    format!(
        "<figure>\n<img src=\"{src}\" alt=\"{caption}\">\n<figcaption>{caption}</figcaption>\n</figure>\n",
        src = escape_html(src),
        caption = escape_html(caption),
    )
}

fn download_link(artifact: &str) -> String {
    let artifact = escape_html(artifact);
    format!("<p><a href=\"/download/{artifact}\">Download {artifact}</a></p>\n")
}

/// `GET /`: the upload form.
pub fn index_page() -> String {
    let accept = ALLOWED_EXTENSIONS
        .iter()
        .map(|ext| format!(".{ext}"))
        .collect::<Vec<_>>()
        .join(",");
    let body = format!(
        "<form action=\"/upload\" method=\"post\" enctype=\"multipart/form-data\">\n\
         <input type=\"file\" name=\"file\" accept=\"{accept}\" required>\n\
         <button type=\"submit\">Enhance</button>\n</form>\n"
    );
    layout("Photo restoration", &body)
}

/// Result of the super-resolution stage, with the trigger for stage two.
pub fn stage1_page(original: &str, stage1: &str, fell_back: bool) -> String {
    let mut body = String::new();
    if fell_back {
        body.push_str(
            "<p class=\"notice\">Super-resolution did not finish in time; \
             the original image is shown in its place.</p>\n",
        );
    }
    body.push_str(&figure("Original", &format!("/static/inputs/{original}")));
    body.push_str(&figure("Super-resolved", &format!("/static/outputs/{stage1}")));
    body.push_str(&download_link(stage1));
    body.push_str(&format!(
        "<form action=\"/apply-stage2\" method=\"post\">\n\
         <input type=\"hidden\" name=\"stage1_filename\" value=\"{}\">\n\
         <button type=\"submit\">Restore faces</button>\n</form>\n",
        escape_html(stage1),
    ));
    layout("Enhanced", &body)
}

/// All three artifacts after face restoration.
pub fn final_page(original: &str, stage1: &str, stage2: &str) -> String {
    let mut body = String::new();
    body.push_str(&figure("Original", &format!("/static/inputs/{original}")));
    body.push_str(&figure("Super-resolved", &format!("/static/outputs/{stage1}")));
    body.push_str(&figure("Faces restored", &format!("/static/outputs/{stage2}")));
    body.push_str(&download_link(stage1));
    body.push_str(&download_link(stage2));
    body.push_str("<p><a href=\"/\">Restore another photo</a></p>\n");
    layout("Restored", &body)
}
