use colored::Colorize;
use ellipse::Ellipse;
use terminal_size::{terminal_size, Width};

use iou_ledger::{
    collaborators::{Command, Parameters},
    plan::{Method, Phase, Update},
    MutationPlan,
};

pub struct Format {
    phase_width: usize,
    key_width: usize,
    value_width: usize,
}

impl Format {
    pub fn new(width: Option<u16>) -> Self {
        let maximum_width = match (width, terminal_size()) {
            (Some(w), _) | (None, Some((Width(w), _))) => w as usize,
            _ => 160,
        };
        let maximum_width = maximum_width.max(60);

        let phase_width = 12;
        let fixed_spaces = 3;
        let after_phase = maximum_width - phase_width - fixed_spaces;
        let key_width = after_phase / 3;
        let value_width = after_phase - key_width;

        Self {
            phase_width,
            key_width,
            value_width,
        }
    }
}

struct Row<'r> {
    phase: Phase,
    update: &'r Update,
}

impl<'r> Row<'r> {
    fn format(self, format: &Format) -> String {
        let method = match self.update.method {
            Method::Set if self.update.value.is_null() => "remove",
            Method::Set => "set",
            Method::Merge => "merge",
        };
        let label = format!("{:?} {}", self.phase, method).to_lowercase();
        let value = self.update.value.to_string();
        let line = format!(
            "{:phase_width$} {:key_width$} {}",
            label,
            self.update.key.as_str().truncate_ellipse(format.key_width - 3),
            value.as_str().truncate_ellipse(format.value_width - 3),
            phase_width = format.phase_width,
            key_width = format.key_width,
        );
        match self.phase {
            Phase::Optimistic => line.yellow().to_string(),
            Phase::Success => line.green().to_string(),
            Phase::Failure => line.red().to_string(),
        }
    }
}

pub fn print_write(command: Command, parameters: &Parameters, plan: &MutationPlan, format: &Format) {
    println!("{}", command.to_string().bold());
    for (key, value) in parameters.iter() {
        println!(
            "  {}={}",
            key,
            value.as_str().truncate_ellipse(format.value_width - 3)
        );
    }
    for phase in [Phase::Optimistic, Phase::Success, Phase::Failure] {
        for update in plan.updates(phase) {
            println!("{}", Row { phase, update }.format(format));
        }
    }
}
