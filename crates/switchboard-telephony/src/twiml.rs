//! Call-control markup generation.

/// Escapes the five XML-significant characters for use in attribute values
/// and text nodes.
fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

/// The bootstrap document returned from `/twiml`: connects the incoming call
/// to the relay WebSocket with a spoken greeting and high interrupt
/// sensitivity.
pub fn bootstrap_document(ws_url: &str, greeting: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <Response>\
         <Connect>\
         <ConversationRelay url=\"{}\" welcomeGreeting=\"{}\" interruptSensitivity=\"high\" />\
         </Connect>\
         </Response>",
        escape_xml(ws_url),
        escape_xml(greeting),
    )
}

/// The termination document: speak a final message, then hang up.
pub fn hangup_document(spoken_text: &str) -> String {
    format!(
        "<Response><Say>{}</Say><Hangup/></Response>",
        escape_xml(spoken_text)
    )
}
