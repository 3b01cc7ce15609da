//! HTML rendering for the history page and live rows.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use html_escape::encode_text;

use smsfeed_core::Message;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>SMS feed</title>
<style>
body { font-family: system-ui, sans-serif; margin: 2rem; }
table { border-collapse: collapse; width: 100%; }
th, td { border-bottom: 1px solid #ddd; padding: .4rem .6rem; text-align: left; vertical-align: top; }
td.timestamp { white-space: nowrap; color: #555; }
td.sender { font-weight: 600; white-space: nowrap; }
#status { font-size: .85rem; color: #888; }
</style>
</head>
<body>
<h1>SMS feed</h1>
<p id="status">connecting…</p>
<table>
<thead><tr><th>Received ({{TZ}})</th><th>Sender</th><th>Text</th></tr></thead>
<tbody id="messages">
{{ROWS}}</tbody>
</table>
<script>
(function () {
  const limit = {{LIMIT}};
  const body = document.getElementById("messages");
  const status = document.getElementById("status");
  function connect() {
    const scheme = location.protocol === "https:" ? "wss://" : "ws://";
    const ws = new WebSocket(scheme + location.host + "/ws");
    ws.onopen = () => { status.textContent = "live"; };
    ws.onmessage = (ev) => {
      const event = JSON.parse(ev.data);
      if (event.type !== "message.created") return;
      body.insertAdjacentHTML("afterbegin", event.html);
      while (body.rows.length > limit) body.deleteRow(-1);
    };
    ws.onclose = () => { status.textContent = "reconnecting…"; setTimeout(connect, 2000); };
  }
  connect();
})();
</script>
</body>
</html>
"#;

/// Renders messages in a fixed display timezone.
#[derive(Clone, Debug)]
pub struct HistoryRenderer {
    tz: Tz,
    limit: usize,
}

impl HistoryRenderer {
    pub fn new(tz: Tz, limit: usize) -> Self {
        Self { tz, limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn format_timestamp(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.tz).format(TIMESTAMP_FORMAT).to_string()
    }

    /// One `<tr>` for `message`, with sender and text escaped.
    pub fn row(&self, message: &Message) -> String {
        format!(
            "<tr><td class='timestamp'>{}</td><td class='sender'>{}</td><td class='text'>{}</td></tr>",
            self.format_timestamp(message.received_at),
            encode_text(&message.sender),
            encode_text(&message.text),
        )
    }

    /// Full page for `messages`, which are expected newest first.
    pub fn page(&self, messages: &[Message]) -> String {
        let rows: String = messages
            .iter()
            .map(|m| {
                let mut row = self.row(m);
                row.push('\n');
                row
            })
            .collect();
        PAGE_TEMPLATE
            .replace("{{TZ}}", &encode_text(self.tz.name()))
            .replace("{{LIMIT}}", &self.limit.to_string())
            .replace("{{ROWS}}", &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use smsfeed_core::MessageId;

    fn message(sender: &str, text: &str) -> Message {
        Message {
            id: MessageId::from_raw(1),
            sender: sender.into(),
            text: text.into(),
            received_at: Utc.with_ymd_and_hms(2026, 1, 15, 21, 30, 5).unwrap(),
        }
    }

    #[test]
    fn utc_formatting() {
        let r = HistoryRenderer::new(Tz::UTC, 100);
        assert_eq!(
            r.format_timestamp(Utc.with_ymd_and_hms(2026, 1, 15, 21, 30, 5).unwrap()),
            "2026-01-15 21:30:05"
        );
    }

    #[test]
    fn timezone_shifts_display() {
        let r = HistoryRenderer::new(Tz::Europe__Moscow, 100);
        assert_eq!(
            r.format_timestamp(Utc.with_ymd_and_hms(2026, 1, 15, 21, 30, 5).unwrap()),
            "2026-01-16 00:30:05"
        );
    }

    #[test]
    fn row_escapes_user_text() {
        let r = HistoryRenderer::new(Tz::UTC, 100);
        let row = r.row(&message("<b>bank</b>", "<script>alert(1)</script> & more"));
        assert!(!row.contains("<script>"));
        assert!(row.contains("&lt;script&gt;"));
        assert!(row.contains("&lt;b&gt;bank&lt;/b&gt;"));
        assert!(row.contains("&amp; more"));
        assert!(row.starts_with("<tr><td class='timestamp'>2026-01-15 21:30:05</td>"));
    }

    #[test]
    fn page_contains_rows_in_given_order() {
        let r = HistoryRenderer::new(Tz::UTC, 25);
        let page = r.page(&[message("second", "b"), message("first", "a")]);
        let second = page.find("second").unwrap();
        let first = page.find("first").unwrap();
        assert!(second < first);
        assert!(page.contains("const limit = 25;"));
        assert!(page.contains("Received (UTC)"));
        assert!(!page.contains("{{ROWS}}"));
    }

    #[test]
    fn empty_page_renders() {
        let page = HistoryRenderer::new(Tz::UTC, 100).page(&[]);
        assert!(page.contains("<tbody id=\"messages\">"));
    }
}
