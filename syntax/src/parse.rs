use anyhow::Result;

use crate::ast::{Line, ProjectRow, SampleRow, SampleSheet};

const TITLE: &str = "Title";

#[derive(Debug, thiserror::Error)]
#[error("Sample sheet error on line {line_no} ('{line}'): {msg}")]
pub struct Error {
    msg: String,
    line_no: usize,
    line: String,
}

impl Error {
    fn new(msg: impl Into<String>, line_no: usize, line: &str) -> Self {
        Self {
            msg: msg.into(),
            line_no,
            line: line.to_owned(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Samples,
    Project,
}

/// Parse a tab-delimited sample sheet.
pub fn parse_sample_sheet(text: &str) -> Result<SampleSheet<'_>> {
    use combine::EasyParser;

    let mut sheet = SampleSheet::default();
    let mut section = Section::Preamble;

    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let (line, remainder) = sheet_line::line()
            .easy_parse(raw)
            .map_err(|e| Error::new(format!("{}", e), line_no, raw))?;
        if !remainder.is_empty() {
            return Err(Error::new("unexpected trailing text", line_no, raw).into());
        }

        match line {
            Line::SampleHeader => section = Section::Samples,
            Line::ProjectHeader => section = Section::Project,
            Line::Comment => {}
            Line::Row(fields) => {
                let fields: Vec<&str> = fields.iter().map(|f| f.trim()).collect();
                add_row(&mut sheet, section, &fields).map_err(|msg| Error::new(msg, line_no, raw))?;
            }
        }
    }
    Ok(sheet)
}

fn add_row<'a>(
    sheet: &mut SampleSheet<'a>,
    section: Section,
    fields: &[&'a str],
) -> Result<(), String> {
    match section {
        Section::Preamble => {
            if fields.len() == 2 && fields[0] == TITLE {
                if sheet.title.is_some() {
                    return Err("title defined more than once".to_owned());
                }
                sheet.title = Some(fields[1]);
                Ok(())
            } else {
                Err("row appears before any '#SampleID' or '#Type' header".to_owned())
            }
        }
        Section::Samples => {
            if fields.len() < 3 {
                return Err(format!(
                    "sample rows need 3 fields (sample, type, path); found {}",
                    fields.len()
                ));
            }
            sheet.samples.push(SampleRow {
                sample: fields[0],
                kind: fields[1],
                path: fields[2],
            });
            Ok(())
        }
        Section::Project => {
            if fields.len() < 2 {
                return Err(format!(
                    "project rows need 2 fields (type, path); found {}",
                    fields.len()
                ));
            }
            sheet.project.push(ProjectRow {
                kind: fields[0],
                path: fields[1],
            });
            Ok(())
        }
    }
}

pub mod prelude {
    pub use combine::parser::char::{char, string};
    pub use combine::parser::range::recognize;
    pub use combine::*;
}

mod sheet_line {
    use super::prelude::*;
    use crate::ast::Line;

    p! {
        field() -> &'a str, {
            recognize(skip_many1(satisfy(|c: char| c != '\t')))
        }
    }

    p! {
        separator() -> (), {
            skip_many1(char('\t'))
        }
    }

    p! {
        rest_of_line() -> (), {
            skip_many(satisfy(|_: char| true))
        }
    }

    p! {
        sample_header() -> Line<'a>, {
            attempt(string("#SampleID")).with(rest_of_line()).map(|_| Line::SampleHeader)
        }
    }

    p! {
        project_header() -> Line<'a>, {
            attempt(string("#Type")).with(rest_of_line()).map(|_| Line::ProjectHeader)
        }
    }

    p! {
        comment() -> Line<'a>, {
            char('#').with(rest_of_line()).map(|_| Line::Comment)
        }
    }

    p! {
        row() -> Line<'a>, {
            sep_end_by1(field(), separator()).map(Line::Row)
        }
    }

    p! {
        line() -> Line<'a>, {
            choice((sample_header(), project_header(), comment(), row()))
        }
    }

    #[cfg(test)]
    mod test {
        use crate::ast::Line;
        use anyhow::Result;
        use combine::EasyParser;

        #[test]
        fn test_row() -> Result<()> {
            assert_eq!(
                Line::Row(vec!["Sample1", "Forward", "/data/S1_R1.fq.gz"]),
                super::line().easy_parse("Sample1\tForward\t/data/S1_R1.fq.gz").unwrap().0
            );
            // repeated and trailing tabs:
            assert_eq!(
                Line::Row(vec!["Nucleotide", "/data/ref.fna"]),
                super::line().easy_parse("Nucleotide\t\t/data/ref.fna\t").unwrap().0
            );
            Ok(())
        }

        #[test]
        fn test_headers_and_comments() -> Result<()> {
            assert_eq!(
                Line::SampleHeader,
                super::line().easy_parse("#SampleID\tType\tPath").unwrap().0
            );
            assert_eq!(
                Line::ProjectHeader,
                super::line().easy_parse("#Type\tPath").unwrap().0
            );
            assert_eq!(
                Line::Comment,
                super::line().easy_parse("## anything at all").unwrap().0
            );
            Ok(())
        }
    }
}
