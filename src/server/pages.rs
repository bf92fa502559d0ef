//! Server-rendered HTML pages.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{Watch, WatchView};

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<link rel="stylesheet" href="/style.css">
</head>
<body>
<nav><a href="/">Download</a> <a href="/watches">Watches</a></nav>
<main>
{body}
</main>
</body>
</html>
"#,
        title = escape_html(title),
        body = body
    )
}

pub fn download_page() -> String {
    layout(
        "Download",
        r#"<h1>Download a video</h1>
<form method="post" action="/">
  <input type="url" name="url" placeholder="https://..." required autofocus>
  <button type="submit">Download</button>
</form>"#,
    )
}

pub fn progress_page(job_id: Uuid) -> String {
    let body = format!(
        r#"<h1>Downloading</h1>
<div id="progress" data-job-id="{job_id}">
  <p id="title">Waiting for metadata...</p>
  <progress id="bar" max="100" value="0"></progress>
  <span id="percent">0%</span>
  <p id="status">running</p>
  <pre id="log"></pre>
</div>
<p><a href="/">Download another</a></p>
<script src="/progress.js"></script>"#,
        job_id = job_id
    );
    layout("Download progress", &body)
}

pub fn watches_page(watches: &[WatchView]) -> String {
    let mut rows = String::new();
    for view in watches {
        let w = &view.watch;
        let state = match (w.enabled, view.active) {
            (false, _) => "disabled",
            (true, true) => "active",
            (true, false) => "outside window",
        };
        let id = escape_html(&w.id);
        rows.push_str(&format!(
            r#"<tr class="{class}">
  <td>{name}</td>
  <td><a href="{url}">{url}</a></td>
  <td><code>{filter}</code></td>
  <td>{start} to {end}</td>
  <td>{interval}h</td>
  <td>{state}</td>
  <td>{last_run}</td>
  <td class="actions">
    <a href="/watches/{id}/edit">Edit</a>
    <form method="post" action="/watches/{id}/run"><button type="submit">Run now</button></form>
    <form method="post" action="/watches/{id}/delete"><button type="submit">Delete</button></form>
  </td>
</tr>
"#,
            class = if view.active { "active" } else { "inactive" },
            name = escape_html(&w.name),
            url = escape_html(&w.playlist_url),
            filter = escape_html(&w.title_filter),
            start = w.start_date,
            end = w.end_date,
            interval = w.interval_hours,
            state = state,
            last_run = escape_html(w.last_run.as_deref().unwrap_or("never")),
            id = id,
        ));
    }

    let table = if watches.is_empty() {
        "<p>No watches yet.</p>".to_string()
    } else {
        format!(
            r#"<table>
<thead><tr><th>Name</th><th>Playlist</th><th>Filter</th><th>Window</th><th>Every</th><th>State</th><th>Last run</th><th></th></tr></thead>
<tbody>
{rows}</tbody>
</table>"#,
            rows = rows
        )
    };

    layout(
        "Watches",
        &format!(
            r#"<h1>Watches</h1>
<p><a href="/watches/add">Add watch</a></p>
{table}"#,
            table = table
        ),
    )
}

/// Add form when `watch` is None, edit form otherwise.
pub fn watch_form_page(watch: Option<&Watch>, today: NaiveDate) -> String {
    let (heading, action) = match watch {
        Some(w) => ("Edit watch", format!("/watches/{}/edit", escape_html(&w.id))),
        None => ("Add watch", "/watches/add".to_string()),
    };
    let name = watch.map(|w| escape_html(&w.name)).unwrap_or_default();
    let url = watch.map(|w| escape_html(&w.playlist_url)).unwrap_or_default();
    let filter = watch.map(|w| escape_html(&w.title_filter)).unwrap_or_default();
    let start = watch.map(|w| w.start_date).unwrap_or(today);
    let end = watch.map(|w| w.end_date).unwrap_or(today);
    let interval = watch.map(|w| w.interval_hours).unwrap_or(4);
    let checked = if watch.map(|w| w.enabled).unwrap_or(true) {
        " checked"
    } else {
        ""
    };

    let body = format!(
        r#"<h1>{heading}</h1>
<form method="post" action="{action}">
  <label>Name <input name="name" value="{name}" required></label>
  <label>Playlist URL <input type="url" name="playlist_url" value="{url}" required></label>
  <label>Title filter (regex) <input name="title_filter" value="{filter}"></label>
  <label>Start date <input type="date" name="start_date" value="{start}" required></label>
  <label>End date <input type="date" name="end_date" value="{end}" required></label>
  <label>Interval (hours) <input type="number" name="interval_hours" min="1" value="{interval}" required></label>
  <label><input type="checkbox" name="enabled"{checked}> Enabled</label>
  <button type="submit">Save</button>
  <a href="/watches">Cancel</a>
</form>"#,
        heading = heading,
        action = action,
        name = name,
        url = url,
        filter = filter,
        start = start,
        end = end,
        interval = interval,
        checked = checked,
    );
    layout(heading, &body)
}
