//! HTML fragment templating for cards and previews.
//!
//! The class names (`link-card-*`, `link-preview-*`) are the styling
//! contract with the host's stylesheet, so they are fixed.

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::model::{PageMetadata, ResponsiveImage};

/// Render a card summarizing page metadata.
///
/// Empty optional fields (description, favicon, social image) drop their
/// wrapper elements entirely rather than rendering blanks.
pub fn card_html(meta: &PageMetadata, show_favicon: bool) -> String {
    let title = encode_text(&meta.title);
    let url_attr = encode_double_quoted_attribute(&meta.url);
    let url_text = encode_text(&meta.url);

    let description = if meta.description.is_empty() {
        String::new()
    } else {
        format!(
            r#"<div class="link-card-description">{}</div>"#,
            encode_text(&meta.description)
        )
    };

    let favicon = if show_favicon && !meta.favicon.is_empty() {
        format!(
            r#"<img class="link-card-favicon" src="{}" alt="{}-favicon"/>"#,
            encode_double_quoted_attribute(&meta.favicon),
            encode_double_quoted_attribute(&meta.title),
        )
    } else {
        String::new()
    };

    let og_image = if meta.og_image.is_empty() {
        String::new()
    } else {
        format!(
            r#"<div class="link-card-image-wrapper"><img class="link-card-image" alt="{}-image" src="{}"/></div>"#,
            encode_double_quoted_attribute(&meta.title),
            encode_double_quoted_attribute(&meta.og_image),
        )
    };

    format!(
        r#"<div><a target="_blank" rel="noopener noreferrer" href="{url_attr}" class="link-card-container"><div class="link-card-wrapper"><div class="link-card-text"><div class="link-card-title">{title}</div>{description}</div><div class="link-card-url">{favicon}<div class="link-card-link">{url_text}</div></div></div>{og_image}</a></div>"#
    )
}

/// Render a preview: the original link text plus, when the capture
/// succeeded, the responsive screenshot image. Without an image this
/// degrades to a bare link.
pub fn preview_html(text: &str, url: &str, image: Option<&ResponsiveImage>) -> String {
    let text = encode_text(text);
    let url_attr = encode_double_quoted_attribute(url);

    let img = match image {
        Some(image) => {
            let mut attrs = format!(
                r#" src="{}""#,
                encode_double_quoted_attribute(&image.src)
            );
            if !image.src_set.is_empty() {
                attrs.push_str(&format!(
                    r#" srcset="{}""#,
                    encode_double_quoted_attribute(&image.src_set)
                ));
            }
            if !image.sizes.is_empty() {
                attrs.push_str(&format!(
                    r#" sizes="{}""#,
                    encode_double_quoted_attribute(&image.sizes)
                ));
            }
            format!(r#"<img class="link-preview-image" loading="lazy"{attrs}/>"#)
        }
        None => String::new(),
    };

    format!(
        r#"<span class="link-preview-container"><a target="_blank" rel="noopener noreferrer" href="{url_attr}">{text}</a>{img}</span>"#
    )
}
