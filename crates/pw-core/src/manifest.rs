//! Compiled-in catalogue of pipeline phases and their task rosters.
//!
//! The manifest fixes the canonical ordering of phases and tasks. Recorded
//! state is overlaid onto it; it is never reloaded while the process runs.

/// One phase of the pipeline together with its fixed task roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSpec {
    pub id: &'static str,
    pub name: &'static str,
    /// `(task_id, display_name)` in canonical order.
    pub tasks: &'static [(&'static str, &'static str)],
}

impl PhaseSpec {
    /// Display name of the manifest task `task_id`, if the phase defines it.
    pub fn task_name(&self, task_id: &str) -> Option<&'static str> {
        self.tasks
            .iter()
            .find(|(id, _)| *id == task_id)
            .map(|(_, name)| *name)
    }

    pub fn has_task(&self, task_id: &str) -> bool {
        self.task_name(task_id).is_some()
    }
}

/// The full ordered list of phases.
pub const PHASES: &[PhaseSpec] = &[
    PhaseSpec {
        id: "0-setup",
        name: "Setup",
        tasks: &[
            ("001", "Mode Selection"),
            ("002", "Config Collection"),
            ("003", "Config Review"),
            ("004", "API Keys"),
            ("005", "Material Scan"),
            ("006", "Reference Materials"),
            ("007", "Environment Setup"),
            ("008", "Repository Setup"),
            ("009", "Environment Check"),
        ],
    },
    PhaseSpec {
        id: "1-discovery",
        name: "Discovery",
        tasks: &[
            ("101", "Entry Validation"),
            ("102", "Corpus Collection"),
            ("103", "Import Requirements"),
            ("104", "Opening Dialogue"),
            ("105", "Agent Selection"),
            ("106", "Discovery Work"),
            ("107", "Approach Selection"),
            ("108", "Discovery Diagrams"),
            ("109", "Phase Audit"),
            ("110", "Closeout"),
        ],
    },
    PhaseSpec {
        id: "2-prd",
        name: "PRD",
        tasks: &[
            ("201", "Entry Validation"),
            ("202", "PRD Setup"),
            ("203", "PRD Interview"),
            ("204", "Agent Selection"),
            ("205", "PRD Authoring"),
            ("206", "PRD Validation"),
            ("207", "PRD Approval"),
            ("208", "Phase Audit"),
            ("209", "Closeout"),
        ],
    },
    PhaseSpec {
        id: "3-tasking",
        name: "Tasking",
        tasks: &[
            ("301", "Entry Initialization"),
            ("302", "Agent Selection"),
            ("303", "Task Decomposition"),
            ("304", "Dependency Analysis"),
            ("305", "Phase Audit"),
            ("306", "Closeout"),
        ],
    },
    PhaseSpec {
        id: "4-specification",
        name: "Specification",
        tasks: &[
            ("401", "Entry Initialization"),
            ("402", "Agent Selection"),
            ("403", "OpenSpec Generation"),
            ("404", "TDD Subtask Injection"),
            ("405", "Phase Audit"),
            ("406", "Closeout"),
        ],
    },
    PhaseSpec {
        id: "5-implementation",
        name: "Implementation",
        tasks: &[
            ("501", "Entry Initialization"),
            ("502", "TDD Setup"),
            ("503", "Agent Selection"),
            ("504", "TDD Execution"),
            ("505", "Validation"),
            ("506", "Phase Audit"),
            ("507", "Closeout"),
        ],
    },
    PhaseSpec {
        id: "6-code-review",
        name: "Code Review",
        tasks: &[
            ("601", "Entry Initialization"),
            ("602", "Agent Selection"),
            ("603", "Code Review"),
            ("604", "Refinement"),
            ("605", "Phase Audit"),
            ("606", "Closeout"),
        ],
    },
    PhaseSpec {
        id: "7-integration",
        name: "Integration",
        tasks: &[
            ("701", "Entry Initialization"),
            ("702", "Integration Setup"),
            ("703", "Agent Selection"),
            ("704", "Testing Execution"),
            ("705", "Integration Approval"),
            ("706", "Phase Audit"),
            ("707", "Closeout"),
        ],
    },
    PhaseSpec {
        id: "8-deployment-prep",
        name: "Deployment Prep",
        tasks: &[
            ("801", "Entry Initialization"),
            ("802", "Deployment Setup"),
            ("803", "Agent Selection"),
            ("804", "Artifact Generation"),
            ("805", "Phase Audit"),
            ("806", "Deployment Approval"),
            ("807", "Closeout"),
        ],
    },
    PhaseSpec {
        id: "9-release",
        name: "Release",
        tasks: &[
            ("901", "Entry Initialization"),
            ("902", "Release Setup"),
            ("903", "Agent Selection"),
            ("904", "Release Execution"),
            ("905", "Release Confirmation"),
            ("906", "Closeout"),
        ],
    },
];

/// Look up a phase by identifier.
pub fn phase(id: &str) -> Option<&'static PhaseSpec> {
    PHASES.iter().find(|p| p.id == id)
}
