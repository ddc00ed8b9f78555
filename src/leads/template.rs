//! Notification bodies for a lead: SMS line, email subject, plain text, HTML.
//!
//! Rendering is pure: the same fields and clock always produce the same output.

use chrono::{DateTime, Utc};

use super::model::Lead;
use crate::channels::NotificationContent;

const PLACEHOLDER: &str = "-";

/// Borrowed view of the lead fields the templates interpolate.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeadFields<'a> {
    pub name: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub service: Option<&'a str>,
    pub message: Option<&'a str>,
    pub ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub referrer: Option<&'a str>,
    pub received_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a Lead> for LeadFields<'a> {
    fn from(lead: &'a Lead) -> Self {
        Self {
            name: Some(&lead.name),
            phone: Some(&lead.phone),
            service: Some(&lead.service),
            message: Some(&lead.message),
            ip: Some(&lead.ip),
            user_agent: Some(&lead.user_agent),
            referrer: Some(&lead.referrer),
            received_at: Some(lead.received_at),
        }
    }
}

/// Render every body for one lead.
pub fn render(fields: &LeadFields<'_>, now: DateTime<Utc>) -> NotificationContent {
    NotificationContent {
        short_text: sms_text(fields),
        subject: email_subject(fields),
        text: lead_text(fields, now),
        html: lead_html(fields, now),
    }
}

pub fn sms_text(f: &LeadFields<'_>) -> String {
    format!(
        "New inquiry from {} ({}) for \"{}\". Msg: {}",
        or_dash(f.name),
        or_dash(f.phone),
        or_dash(f.service),
        or_dash(f.message)
    )
}

pub fn email_subject(f: &LeadFields<'_>) -> String {
    format!("New Lead: {} - {}", or_dash(f.service), or_dash(f.name))
}

pub fn lead_text(f: &LeadFields<'_>, now: DateTime<Utc>) -> String {
    let received = f.received_at.unwrap_or(now).to_rfc3339();
    format!(
        "New Lead Received\n\
         \n\
         Name: {}\n\
         Phone: {}\n\
         Service: {}\n\
         Message: {}\n\
         \n\
         Received at: {received}\n\
         IP: {}\n\
         User-Agent: {}\n\
         Referrer: {}\n",
        or_dash(f.name),
        or_dash(f.phone),
        or_dash(f.service),
        or_dash(f.message),
        or_dash(f.ip),
        or_dash(f.user_agent),
        or_dash(f.referrer),
    )
}

pub fn lead_html(f: &LeadFields<'_>, now: DateTime<Utc>) -> String {
    let received = f
        .received_at
        .unwrap_or(now)
        .format("%Y-%m-%d %H:%M:%S UTC")
        .to_string();
    let esc = |v: Option<&str>| escape_html(or_dash(v));

    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
<meta name=\"viewport\" content=\"width=device-width,initial-scale=1\"></head><body>\n\
<div style=\"font-family:Arial,Helvetica,sans-serif;max-width:600px;margin:12px auto;padding:18px;background:#fff;border-radius:8px;border:1px solid #eee\">\n\
  <h2>New Lead Received</h2>\n\
  <p><strong>Name:</strong> {name}</p>\n\
  <p><strong>Phone:</strong> {phone}</p>\n\
  <p><strong>Service:</strong> {service}</p>\n\
  <p><strong>Message:</strong></p><div style=\"padding:8px;background:#f8fafc;border-radius:6px\">{message}</div>\n\
  <p style=\"color:#64748b;font-size:12px\">Received at: {received}<br/>IP: {ip}<br/>Referrer: {referrer}</p>\n\
</div></body></html>",
        name = esc(f.name),
        phone = esc(f.phone),
        service = esc(f.service),
        message = esc(f.message),
        received = escape_html(&received),
        ip = esc(f.ip),
        referrer = esc(f.referrer),
    )
}

/// Escape `&`, `<`, `>` and `"` for interpolation into HTML.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn or_dash(v: Option<&str>) -> &str {
    match v.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => PLACEHOLDER,
    }
}
