use std::fmt::Write;

use places_core::query::{PageResult, Recommendation};
use places_core::Place;

const STYLE: &str = "body{font-family:sans-serif;margin:2em}li{margin:.5em 0}.muted{color:#666}nav a{margin-right:1em}";

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
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

fn page(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{t}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}</body>\n</html>\n",
        t = escape(title)
    )
}

fn place_items(out: &mut String, places: &[Place]) {
    out.push_str("<ul>\n");
    for p in places {
        let _ = writeln!(
            out,
            "<li><div>{}</div><div class=\"muted\">{}</div><div class=\"muted\">{}</div></li>",
            escape(&p.name),
            escape(&p.address),
            escape(&p.phone)
        );
    }
    out.push_str("</ul>\n");
}

pub fn places_page(data: &PageResult) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<h5>Total: {}</h5>", data.total);
    place_items(&mut body, &data.places);
    body.push_str("<nav>\n");
    if data.has_prev {
        let _ = writeln!(body, "<a href=\"/web/places?page={}\">First</a>", data.first_page);
        let _ = writeln!(body, "<a href=\"/web/places?page={}\">Previous</a>", data.prev_page);
    }
    if data.has_next {
        let _ = writeln!(body, "<a href=\"/web/places?page={}\">Next</a>", data.next_page);
        let _ = writeln!(body, "<a href=\"/web/places?page={}\">Last</a>", data.last_page);
    }
    body.push_str("</nav>\n");
    page("Places", &body)
}

pub fn recommendation_page(data: &Recommendation) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "<h5>Nearest of {} places</h5>", data.total);
    place_items(&mut body, &data.places);
    page(&data.name, &body)
}
