//! Message composition: template substitution and the safety footer.
//!
//! The substitution contract is deliberately small — a single named
//! placeholder, `{{username}}`, replaced with the platform's mention syntax
//! at send time. Public channel posts go out with the template untouched
//! (there is no single recipient to mention).

/// The recipient-mention placeholder operators put in templates.
pub const MENTION_PLACEHOLDER: &str = "{{username}}";

/// Posted into the configured safety channel at fire time; the resulting
/// message's ids become the verification deep link in every DM.
pub const SAFETY_CHANNEL_NOTICE: &str = "Members of this community may receive direct \
messages from the community manager(s). To verify that such a message is legitimate, \
compare its sender with the bot identity that posted this notice.";

/// Substitute every occurrence of [`MENTION_PLACEHOLDER`] with `mention`.
pub fn render_template(template: &str, mention: &str) -> String {
    template.replace(MENTION_PLACEHOLDER, mention)
}

/// Footer appended to private messages when a safety notice was posted.
pub fn safety_footer(link: &str) -> String {
    format!(
        "*This message was sent to you because you are part of this community. \
To verify its legitimacy, see the verification notice posted in the community's \
server: {link}*"
    )
}

/// Full private-message text: rendered template plus optional safety footer.
pub fn compose_private(template: &str, mention: &str, safety_link: Option<&str>) -> String {
    let rendered = render_template(template, mention);
    match safety_link {
        Some(link) => format!("{rendered}\n{}", safety_footer(link)),
        None => rendered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_substituted_everywhere() {
        let out = render_template("Hey {{username}}! Yes, you, {{username}}.", "<@u1>");
        assert_eq!(out, "Hey <@u1>! Yes, you, <@u1>.");
    }

    #[test]
    fn template_without_placeholder_is_untouched() {
        let out = render_template("Plain announcement text.", "<@u1>");
        assert_eq!(out, "Plain announcement text.");
    }

    #[test]
    fn private_message_carries_the_safety_link() {
        let link = "https://discord.com/channels/g/c/m";
        let out = compose_private("Hi {{username}}", "<@u1>", Some(link));
        assert!(out.starts_with("Hi <@u1>\n"));
        assert!(out.contains(link));
    }

    #[test]
    fn no_safety_channel_means_no_footer() {
        let out = compose_private("Hi {{username}}", "<@u1>", None);
        assert_eq!(out, "Hi <@u1>");
    }
}
