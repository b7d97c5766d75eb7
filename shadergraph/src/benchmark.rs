use std::fmt::Write;
use std::time::Duration;

use log::debug;

/// Timing tree of one evaluation: a node per processor invocation with the
/// invocations it triggered as children.
#[derive(Clone, Default, Debug)]
pub struct Benchmark {
    pub name: String,
    pub elapsed: Duration,
    pub children: Vec<Benchmark>,
}

impl Benchmark {
    pub fn new(name: impl Into<String>) -> Benchmark {
        Benchmark {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_child(&mut self, child: Benchmark) {
        self.children.push(child);
    }

    /// Time spent in this invocation excluding its children.
    pub fn exclusive(&self) -> Duration {
        let children: Duration = self.children.iter().map(|child| child.elapsed).sum();
        self.elapsed.saturating_sub(children)
    }

    pub fn report(&self) -> String {
        let mut report = String::new();
        self.write_report(&mut report, 0);
        report
    }

    fn write_report(&self, report: &mut String, depth: usize) {
        let _ = writeln!(
            report,
            "{:indent$}{}: {:.3} ms (self {:.3} ms)",
            "",
            self.name,
            self.elapsed.as_secs_f64() * 1000.0,
            self.exclusive().as_secs_f64() * 1000.0,
            indent = depth * 2
        );
        for child in self.children.iter() {
            child.write_report(report, depth + 1);
        }
    }

    pub fn log_report(&self) {
        debug!("Benchmark\n{}", self.report());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::benchmark::Benchmark;

    #[test]
    fn exclusive_time_subtracts_children() {
        let mut root = Benchmark::new("root");
        root.elapsed = Duration::from_millis(10);
        let mut child = Benchmark::new("child");
        child.elapsed = Duration::from_millis(4);
        root.add_child(child);

        assert_eq!(root.exclusive(), Duration::from_millis(6));

        let report = root.report();
        assert!(report.starts_with("root: 10.000 ms (self 6.000 ms)"));
        assert!(report.contains("\n  child: 4.000 ms"));
    }
}
