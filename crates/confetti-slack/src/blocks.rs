//! Block Kit rendering for [`MessageContent`].

use serde_json::{Value, json};

use confetti_core::{CollectionForm, MessageContent};

/// Action id of the collection form's submit button.
pub const SUBMIT_ACTION_ID: &str = "submit_birthday_content";

pub(crate) const MESSAGE_BLOCK: &str = "message_input_block";
pub(crate) const MESSAGE_ACTION: &str = "message_input";
pub(crate) const MEDIA_BLOCK: &str = "media_input_block";
pub(crate) const MEDIA_ACTION: &str = "media_input";
pub(crate) const DESCRIPTION_BLOCK: &str = "description_input_block";
pub(crate) const DESCRIPTION_ACTION: &str = "description_input";

/// Longest text Slack accepts in a section block.
const MAX_SECTION_CHARS: usize = 3000;

fn section(text: &str) -> Value {
    json!({
        "type": "section",
        "text": { "type": "mrkdwn", "text": text }
    })
}

/// Split `text` into section-sized pieces, breaking at line ends where a
/// line fits.
fn split_section_text(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > MAX_SECTION_CHARS && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > MAX_SECTION_CHARS {
            let chars: Vec<char> = line.chars().collect();
            pieces.extend(chars.chunks(MAX_SECTION_CHARS).map(|c| c.iter().collect()));
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
        .into_iter()
        .map(|p| p.trim_end_matches('\n').to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn sections(text: &str) -> impl Iterator<Item = Value> {
    split_section_text(text).into_iter().map(|piece| section(&piece))
}

fn text_input(
    block_id: &str,
    action_id: &str,
    label: &str,
    placeholder: &str,
    multiline: bool,
    optional: bool,
) -> Value {
    json!({
        "type": "input",
        "block_id": block_id,
        "optional": optional,
        "element": {
            "type": "plain_text_input",
            "action_id": action_id,
            "multiline": multiline,
            "placeholder": { "type": "plain_text", "text": placeholder }
        },
        "label": { "type": "plain_text", "text": label }
    })
}

fn form_blocks(form: &CollectionForm) -> Vec<Value> {
    vec![
        text_input(
            MESSAGE_BLOCK,
            MESSAGE_ACTION,
            "Your Birthday Message",
            "Type your birthday message here...",
            true,
            false,
        ),
        text_input(
            MEDIA_BLOCK,
            MEDIA_ACTION,
            "Optional: Add Media (Hint: Use /giphy to search for a GIF and copy the URL)",
            "Paste a URL to a GIF or image...",
            false,
            true,
        ),
        json!({ "type": "divider" }),
        text_input(
            DESCRIPTION_BLOCK,
            DESCRIPTION_ACTION,
            "Describe Them",
            &form.description_prompt,
            true,
            true,
        ),
        json!({
            "type": "actions",
            "block_id": "submit_block",
            "elements": [{
                "type": "button",
                "text": { "type": "plain_text", "text": "Submit", "emoji": true },
                "action_id": SUBMIT_ACTION_ID,
                "value": form.celebrant_id,
            }]
        }),
    ]
}

/// Render rich content as Block Kit blocks.
///
/// Plain text content renders as `None`; the caller then sends `text` alone.
/// When a form is present, `text` is only the notification fallback and the
/// heading (if any) introduces the form.
pub fn render_blocks(content: &MessageContent) -> Option<Vec<Value>> {
    if content.heading.is_none() && content.image.is_none() && content.form.is_none() {
        return None;
    }

    let mut blocks = Vec::new();
    if let Some(heading) = &content.heading {
        blocks.extend(sections(heading));
    }

    match &content.form {
        Some(form) => blocks.extend(form_blocks(form)),
        None => {
            blocks.extend(sections(&content.text));
        }
    }

    if let Some(image) = &content.image {
        blocks.push(json!({
            "type": "image",
            "image_url": image.url,
            "alt_text": image.alt_text,
        }));
    }

    Some(blocks)
}
