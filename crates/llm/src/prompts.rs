//! Prompt construction for each per-block call.

use crate::client::ChatMessage;
use deck_core::{AssignmentRequest, RewriteContext, SelectionRequest, SlidePosition};

const EXPERT: &str = "You are an expert at building presentation decks.";

pub fn rewrite(text: &str, context: &RewriteContext) -> Vec<ChatMessage> {
    let system = format!(
        "{}\n\
         Rewrite the slide content you are given so it works on a slide.\n\
         \n\
         Guidelines:\n\
         1. Make it concise and easy to follow.\n\
         2. Prefer bullet points or another clear structure.\n\
         3. Make the key points stand out.\n\
         4. Keep the intent of the original and write in its language.\n\
         \n\
         Reply with the rewritten content only.",
        EXPERT
    );

    let user = format!(
        "This is slide {} of {} ({}).\n\nSlide content:\n\n{}",
        context.index + 1,
        context.total,
        position_label(context.position()),
        text
    );

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn select_template(request: &SelectionRequest<'_>) -> Vec<ChatMessage> {
    let mut templates = String::new();
    for template in request.templates {
        templates.push_str(&format!("- id: {}\n  name: {}\n", template.id, template.name));
        if !template.description.is_empty() {
            templates.push_str(&format!("  description: {}\n", template.description));
        }
        if !template.use_case_examples.is_empty() {
            templates.push_str(&format!(
                "  use cases: {}\n",
                template.use_case_examples.join("; ")
            ));
        }
    }

    let system = format!(
        "{}\n\
         Choose the best template for the slide content you are given.\n\
         \n\
         Available templates:\n\
         {}\n\
         Guidelines:\n\
         1. Pick the template that best fits the content and its purpose.\n\
         2. Use the listed use cases as a reference.\n\
         3. Consider where the slide sits in the deck (first, middle, last).\n\
         \n\
         Reply with the id of the chosen template only.",
        EXPERT, templates
    );

    let position = RewriteContext::new(request.block_index, request.total_blocks).position();
    let user = format!(
        "Slide {} of {} ({}).\nContent:\n{}",
        request.block_index + 1,
        request.total_blocks,
        position_label(position),
        request.text
    );

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub fn assign_content(request: &AssignmentRequest<'_>) -> Vec<ChatMessage> {
    let slots: Vec<String> = request
        .slots
        .iter()
        .map(|slot| format!("- {} ({}): {}", slot.name, slot.slot_type, slot.role))
        .collect();
    let example: Vec<String> = request
        .slots
        .iter()
        .map(|slot| format!("\"{}\": \"...\"", slot.name))
        .collect();

    let system = format!(
        "{}\n\
         Distribute the slide content over the objects of the template below.\n\
         \n\
         Template: {}\n\
         Objects:\n\
         {}\n\
         \n\
         Reply with a JSON object that has exactly one string value per object \
         name and no other keys. For image objects give a short description or \
         path of the image.\n\
         Example: {{{}}}",
        EXPERT,
        request.template_name,
        slots.join("\n"),
        example.join(", ")
    );

    let user = format!("Slide content:\n\n{}", request.text);

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

fn position_label(position: SlidePosition) -> &'static str {
    match position {
        SlidePosition::Opening => "opening slide",
        SlidePosition::Body => "body slide",
        SlidePosition::Closing => "closing slide",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Role;
    use deck_core::{SlotSpec, TemplateSummary};

    #[test]
    fn test_rewrite_mentions_position() {
        let messages = rewrite("Thanks!", &RewriteContext::new(2, 3));
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[1].content.contains("slide 3 of 3 (closing slide)"));
        assert!(messages[1].content.ends_with("Thanks!"));
    }

    #[test]
    fn test_selection_lists_templates() {
        let templates = vec![
            TemplateSummary {
                id: "cover".to_string(),
                name: "Cover".to_string(),
                description: "Title page".to_string(),
                use_case_examples: vec!["Opening".to_string(), "Section start".to_string()],
            },
            TemplateSummary {
                id: "bullets".to_string(),
                name: "Bullets".to_string(),
                description: String::new(),
                use_case_examples: Vec::new(),
            },
        ];
        let request = SelectionRequest {
            block_index: 0,
            total_blocks: 4,
            text: "# Launch",
            templates: &templates,
        };

        let messages = select_template(&request);
        assert!(messages[0].content.contains("- id: cover"));
        assert!(messages[0].content.contains("use cases: Opening; Section start"));
        assert!(messages[0].content.contains("- id: bullets"));
        assert!(messages[1].content.contains("(opening slide)"));
    }

    #[test]
    fn test_assignment_lists_slots() {
        let slots = vec![
            SlotSpec::text("title", "Slide title"),
            SlotSpec::image("figure", "Illustration"),
        ];
        let request = AssignmentRequest {
            block_index: 1,
            text: "body",
            template_id: "t",
            template_name: "Figure",
            slots: &slots,
        };

        let messages = assign_content(&request);
        assert!(messages[0].content.contains("- title (text): Slide title"));
        assert!(messages[0].content.contains("- figure (image): Illustration"));
        assert!(messages[0].content.contains(r#"{"title": "...", "figure": "..."}"#));
    }
}
