use funnelsight_core::flows::AnalysisFlow;

/// Mermaid flowchart of the question workflow.
pub fn run() -> String {
    AnalysisFlow::render_mermaid()
}
