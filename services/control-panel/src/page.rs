//! Server-rendered panel page.

use std::fmt::Write;

use fedpanel_core::{Constraint, Control, ControlValue, Section, TrainingConfig, VisualizationStatus};

const STYLE: &str = r#"
    body { margin: 0; font-family: system-ui, sans-serif; background: #f6f7f9; color: #1d232b; }
    .wrap { max-width: 1400px; margin: 0 auto; padding: 20px; }
    h1 { margin: 0 0 16px; font-size: 26px; }
    h2 { margin: 18px 0 8px; font-size: 18px; border-bottom: 1px solid #cfd5dd; padding-bottom: 4px; }
    .row { display: flex; flex-wrap: wrap; gap: 14px; margin-bottom: 10px; }
    .field { display: flex; flex-direction: column; min-width: 150px; flex: 1; font-size: 13px; }
    .field label { font-weight: 600; margin-bottom: 4px; }
    .field.toggle { flex-direction: row; align-items: center; gap: 6px; }
    button { margin: 14px 0; padding: 10px 18px; font-size: 15px; background: #e8590c; color: #fff; border: 0; border-radius: 4px; cursor: pointer; }
    button:disabled { opacity: 0.6; cursor: wait; }
    textarea { width: 100%; min-height: 60px; font-family: monospace; }
    .notice { padding: 14px; background: #fff3bf; border: 1px solid #e0b400; border-radius: 4px; }
    iframe { border: 1px solid #cfd5dd; }
"#;

const SCRIPT: &str = r#"
    function collectValues() {
      return CONTROL_NAMES.map(function (name) {
        var el = document.getElementById("ctl-" + name);
        switch (el.dataset.kind) {
          case "toggle": return el.checked;
          case "range":
          case "number": return Number(el.value);
          default: return el.value;
        }
      });
    }
    document.querySelectorAll("input[type=range]").forEach(function (el) {
      el.addEventListener("input", function () {
        document.getElementById("out-" + el.name).textContent = el.value;
      });
    });
    document.getElementById("start").addEventListener("click", async function () {
      var button = this;
      var progress = document.getElementById("progress");
      button.disabled = true;
      progress.value = "Training in progress...";
      try {
        var resp = await fetch("/api/train", {
          method: "POST",
          headers: { "Content-Type": "application/json" },
          body: JSON.stringify({ values: collectValues() })
        });
        var type = resp.headers.get("Content-Type") || "";
        if (type.indexOf("application/json") === 0) {
          progress.value = (await resp.json()).message;
        } else {
          var text = await resp.text();
          progress.value = (resp.status >= 500 ? "Training failed: " : "Invalid input: ") + text;
        }
      } catch (e) {
        progress.value = "Training failed: " + e;
      } finally {
        button.disabled = false;
      }
    });
"#;

pub struct Page<'a> {
    pub title: &'a str,
    pub controls: &'a [Control],
    /// Initial widget values come from here rather than the declared defaults.
    pub base: &'a TrainingConfig,
    pub visualization: &'a VisualizationStatus,
    pub visualization_url: &'a str,
    pub frame_height: u32,
}

impl Page<'_> {
    pub fn render(&self) -> String {
        let mut html = String::with_capacity(16 * 1024);
        let title = html_escape(self.title);
        let _ = write!(
            html,
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\" />\n<title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<div class=\"wrap\">\n<h1>{title}</h1>\n"
        );

        for section in Section::ALL {
            let _ = writeln!(html, "<h2>{}</h2>", section.heading());
            let mut in_section: Vec<&Control> = self.controls.iter().filter(|c| c.section == section).collect();
            in_section.sort_by_key(|c| c.row);
            for row in in_section.chunk_by(|a, b| a.row == b.row) {
                html.push_str("<div class=\"row\">\n");
                for control in row {
                    let value = self.base.field(control.name).unwrap_or_else(|| control.default.clone());
                    self.widget(&mut html, control, &value);
                }
                html.push_str("</div>\n");
            }
        }

        html.push_str("<button id=\"start\" type=\"button\">▶ Start Training</button>\n");
        html.push_str("<div class=\"field\"><label for=\"progress\">Training Progress</label><textarea id=\"progress\" readonly></textarea></div>\n");
        self.frame(&mut html);

        let names: Vec<&str> = self.controls.iter().map(|c| c.name).collect();
        let names = serde_json::to_string(&names).unwrap_or_else(|_| "[]".to_string());
        let _ = write!(html, "</div>\n<script>\nconst CONTROL_NAMES = {names};\n{SCRIPT}</script>\n</body>\n</html>\n");
        html
    }

    fn widget(&self, html: &mut String, control: &Control, value: &ControlValue) {
        let name = control.name;
        let label = html_escape(control.label);
        match &control.constraint {
            Constraint::Choice { choices } => {
                let current = value.to_string();
                let _ = write!(html, "<div class=\"field\"><label for=\"ctl-{name}\">{label}</label><select id=\"ctl-{name}\" name=\"{name}\" data-kind=\"choice\">");
                for choice in choices.iter() {
                    let selected = if *choice == current { " selected" } else { "" };
                    let choice = html_escape(choice);
                    let _ = write!(html, "<option value=\"{choice}\"{selected}>{choice}</option>");
                }
                html.push_str("</select></div>\n");
            }
            Constraint::Range { min, max, step } => {
                let _ = writeln!(
                    html,
                    "<div class=\"field\"><label for=\"ctl-{name}\">{label} <output id=\"out-{name}\">{value}</output></label><input type=\"range\" id=\"ctl-{name}\" name=\"{name}\" data-kind=\"range\" min=\"{min}\" max=\"{max}\" step=\"{step}\" value=\"{value}\" /></div>"
                );
            }
            Constraint::Number { whole } => {
                let step = if *whole { "1" } else { "any" };
                let _ = writeln!(
                    html,
                    "<div class=\"field\"><label for=\"ctl-{name}\">{label}</label><input type=\"number\" id=\"ctl-{name}\" name=\"{name}\" data-kind=\"number\" step=\"{step}\" value=\"{value}\" /></div>"
                );
            }
            Constraint::Toggle => {
                let checked = if matches!(value, ControlValue::Flag(true)) { " checked" } else { "" };
                let _ = writeln!(
                    html,
                    "<div class=\"field toggle\"><input type=\"checkbox\" id=\"ctl-{name}\" name=\"{name}\" data-kind=\"toggle\"{checked} /><label for=\"ctl-{name}\">{label}</label></div>"
                );
            }
        }
    }

    fn frame(&self, html: &mut String) {
        match self.visualization.problem() {
            None => {
                let _ = writeln!(
                    html,
                    "<iframe id=\"visualization\" src=\"{}\" width=\"100%\" height=\"{}px\"></iframe>",
                    html_escape(self.visualization_url),
                    self.frame_height
                );
            }
            Some(reason) => {
                let _ = writeln!(html, "<div id=\"visualization\" class=\"notice\">Visualization unavailable: {}</div>", html_escape(&reason));
            }
        }
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
