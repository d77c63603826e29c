//! Call-control document (TwiML) generation.
//!
//! The document tells the carrier to open a bidirectional media websocket
//! back to this server, passing the session id as a custom parameter so the
//! bridge can bind the socket immediately.

/// Render the call-control XML for a session.
pub fn call_control_document(ws_base: &str, session_id: &str) -> String {
    let stream_url = xml_escape(&format!("{ws_base}/twilio/call"));
    let session_id = xml_escape(session_id);
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <Response>\n\
         \x20 <Connect>\n\
         \x20   <Stream url=\"{stream_url}\">\n\
         \x20     <Parameter name=\"sessionId\" value=\"{session_id}\" />\n\
         \x20   </Stream>\n\
         \x20 </Connect>\n\
         </Response>\n"
    )
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_connects_a_stream_with_session_parameter() {
        let xml = call_control_document("wss://calls.example.org", "s-123");
        assert!(xml.starts_with("<?xml version=\"1.0\""));
        assert!(xml.contains("<Connect>"));
        assert!(xml.contains("url=\"wss://calls.example.org/twilio/call\""));
        assert!(xml.contains("<Parameter name=\"sessionId\" value=\"s-123\" />"));
    }

    #[test]
    fn escapes_xml_metacharacters() {
        let xml = call_control_document("ws://h", "a\"<&>");
        assert!(xml.contains("value=\"a&quot;&lt;&amp;&gt;\""));
    }
}
