/// One row of a patch listing. `large` flags patches whose up action is
/// expected to run long, so the operator can plan a maintenance window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub large: bool,
}

/// Operator interaction surface. The terminal implementation lives in the
/// CLI; the flows take the trait so they can run scripted in tests.
pub trait Console {
    /// One line of operator-facing output.
    fn say(&self, line: &str);

    /// A patch listing under a heading.
    fn list(&self, heading: &str, entries: &[ListEntry]);

    /// Prompts until an allowed choice arrives. Bare Enter picks the
    /// default when there is one, otherwise the prompt repeats.
    fn choose(&self, prompt: &str, default: Option<char>, choices: &[char]) -> char;
}
