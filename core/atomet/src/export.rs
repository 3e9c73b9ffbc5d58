//! Prometheus text exposition.
//!
//! The registry core has no HTTP server, scrape endpoint or file output;
//! those are external collaborators. What ships here is the rendering of
//! a [`Set`](crate::Set)'s current state into the Prometheus text format,
//! one line per registered metric:
//!
//! ```text
//! family{label="value",...} 125
//! ```
//!
//! with the `{...}` part omitted when the tag set is empty. Lines are
//! sorted, so the output is deterministic and diff-friendly.

use std::fmt::{self, Write};

use crate::set::{Metric, RegisteredMetric, Set};

impl Set {
    /// Writes every registered metric as one exposition line, sorted by
    /// family and tags.
    ///
    /// Values are read through each instrument's own atomic interface;
    /// the registry lock is only held while snapshotting the entry list,
    /// never while formatting or invoking gauge callbacks.
    pub fn write_prometheus<W: fmt::Write>(&self, w: &mut W) -> fmt::Result {
        let mut lines: Vec<String> = self.snapshot().iter().map(exposition_line).collect();
        lines.sort_unstable();
        for line in &lines {
            w.write_str(line)?;
            w.write_char('\n')?;
        }
        Ok(())
    }
}

fn exposition_line(entry: &RegisteredMetric) -> String {
    let mut line = String::with_capacity(entry.family.as_str().len() + 16);
    line.push_str(entry.family.as_str());
    if !entry.tags.is_empty() {
        line.push('{');
        for (i, tag) in entry.tags.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            write!(line, "{tag}").expect("writing a tag to a String should not fail");
        }
        line.push('}');
    }
    match &entry.metric {
        Metric::Counter(c) => {
            write!(line, " {}", c.get()).expect("writing a u64 to a String should not fail");
        }
        Metric::Gauge(g) => {
            write!(line, " {}", g.get()).expect("writing an f64 to a String should not fail");
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::set::Set;

    fn render(set: &Set) -> String {
        let mut out = String::new();
        set.write_prometheus(&mut out).unwrap();
        out
    }

    #[test]
    fn empty_set_renders_nothing() {
        assert_eq!(render(&Set::new()), "");
    }

    #[test]
    fn tagless_metric_has_no_braces() {
        let set = Set::new();
        set.new_counter("bare", &[]).unwrap().set(125);
        assert_eq!(render(&set), "bare 125\n");
    }

    #[test]
    fn tags_render_in_insertion_order() {
        let set = Set::new();
        set.new_counter("reqs", &["method", "get", "code", "200"])
            .unwrap()
            .add(7);
        assert_eq!(render(&set), "reqs{method=\"get\",code=\"200\"} 7\n");
    }

    #[test]
    fn gauges_render_as_floats() {
        let set = Set::new();
        set.new_gauge("temp", &[]).unwrap().set(54.5);
        set.new_gauge("load", &[]).unwrap().set(3.0);
        // f64 Display drops the trailing ".0".
        assert_eq!(render(&set), "load 3\ntemp 54.5\n");
    }

    #[test]
    fn output_is_sorted() {
        let set = Set::new();
        set.new_counter("b_metric", &[]).unwrap().inc();
        set.new_counter("a_metric", &["z", "1"]).unwrap().inc();
        set.new_counter("a_metric", &["y", "1"]).unwrap().inc();
        assert_eq!(
            render(&set),
            "a_metric{y=\"1\"} 1\na_metric{z=\"1\"} 1\nb_metric 1\n"
        );
    }
}
