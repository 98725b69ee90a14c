/// A parsed sample sheet, borrowing from the sheet's text.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SampleSheet<'a> {
    /// Value of the `Title` line, if present.
    pub title: Option<&'a str>,
    /// Rows from the `#SampleID	Type	Path` section(s).
    pub samples: Vec<SampleRow<'a>>,
    /// Rows from the `#Type	Path` section(s).
    pub project: Vec<ProjectRow<'a>>,
}

/// A file belonging to a single sample.
#[derive(Debug, PartialEq, Eq)]
pub struct SampleRow<'a> {
    pub sample: &'a str,
    pub kind: &'a str,
    pub path: &'a str,
}

/// A file belonging to the project as a whole.
#[derive(Debug, PartialEq, Eq)]
pub struct ProjectRow<'a> {
    pub kind: &'a str,
    pub path: &'a str,
}

/// One line of a sample sheet, as recognized by the line parser.
#[derive(Debug, PartialEq, Eq)]
pub enum Line<'a> {
    /// `#SampleID ...`
    SampleHeader,
    /// `#Type ...`
    ProjectHeader,
    /// any other line starting with '#'
    Comment,
    /// tab-separated fields
    Row(Vec<&'a str>),
}
