use super::resolver::Outcome;
use super::session::ApprovalSession;
use chrono::{DateTime, Utc};

const STYLE: &str = "body{font-family:system-ui,sans-serif;max-width:40rem;margin:3rem auto;padding:0 1rem;color:#222}\
dt{font-weight:600;margin-top:.6rem}dd{margin:0}code{background:#f3f3f3;padding:.1rem .3rem;border-radius:3px}\
form{display:inline}button{font-size:1rem;padding:.5rem 1.4rem;margin:1.2rem .6rem 0 0;border:0;border-radius:4px;cursor:pointer}\
.approve{background:#1a7f37;color:#fff}.deny{background:#cf222e;color:#fff}.muted{color:#666}";

/// Landing page for a session. Shows the buttons only while pending.
pub fn landing(
    session: &ApprovalSession,
    token: &str,
    expires_at: DateTime<Utc>,
    outcome: Option<Outcome>,
) -> String {
    let actions = match outcome {
        None => format!(
            r#"<form method="post" action="/session/{token}/approve"><button class="approve" type="submit">Approve</button></form>
<form method="post" action="/session/{token}/deny"><button class="deny" type="submit">Deny</button></form>
<p class="muted">Expires in <span id="countdown">{remaining}</span>.</p>
<script>
(function(){{var end={end};var el=document.getElementById("countdown");
function tick(){{var s=Math.max(0,Math.floor((end-Date.now())/1000));
el.textContent=Math.floor(s/60)+"m "+(s%60)+"s";if(s>0)setTimeout(tick,1000);}}tick();}})();
</script>"#,
            token = escape(token),
            remaining = escape(&remaining(expires_at)),
            end = expires_at.timestamp_millis(),
        ),
        Some(outcome) => format!("<p><strong>This request was {}.</strong></p>", outcome),
    };

    format!(
        r#"<!doctype html>
<html><head><meta charset="utf-8"><title>guardian approval: {scope}.{operation}</title><style>{style}</style></head>
<body>
<h1>Guardian approval</h1>
<dl>
<dt>Project</dt><dd>{project}</dd>
<dt>Operation</dt><dd><code>{scope}.{operation}</code></dd>
<dt>Command</dt><dd><code>{command}</code></dd>
<dt>Reason</dt><dd>{reason}</dd>
<dt>Policy</dt><dd>{policy}</dd>
<dt>Expires</dt><dd>{expires}</dd>
</dl>
{actions}
</body></html>"#,
        style = STYLE,
        scope = escape(&session.scope),
        operation = escape(&session.operation),
        project = escape(&session.project_name),
        command = escape(&session.full_command),
        reason = escape(&session.reason),
        policy = escape(&session.policy.name),
        expires = escape(&expires_at.to_rfc3339()),
        actions = actions,
    )
}

/// Page returned after an approve or deny click
pub fn result(session: &ApprovalSession, recorded: Outcome, accepted: bool) -> String {
    let headline = if accepted {
        format!("Request {}.", recorded)
    } else {
        format!("This request was already {}.", recorded)
    };

    format!(
        r#"<!doctype html>
<html><head><meta charset="utf-8"><title>guardian: {headline}</title><style>{style}</style></head>
<body>
<h1>{headline}</h1>
<p><code>{command}</code></p>
<p class="muted">You can close this tab and return to the terminal.</p>
</body></html>"#,
        headline = escape(&headline),
        style = STYLE,
        command = escape(&session.full_command),
    )
}

fn remaining(expires_at: DateTime<Utc>) -> String {
    let secs = (expires_at - Utc::now()).num_seconds().max(0);
    format!("{}m {}s", secs / 60, secs % 60)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
