use crate::error::PreprocessError;
use crate::markup::StyleBlock;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub range: Range<usize>,
    pub replacement: String,
}

/// Offsets always refer to the original source, so edits queue in any order.
#[derive(Debug, Clone)]
pub struct Splice<'s> {
    source: &'s str,
    overwrites: Vec<Edit>,
    inserts: Vec<(usize, String)>,
    appended: Option<String>,
}

impl<'s> Splice<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            overwrites: Vec::new(),
            inserts: Vec::new(),
            appended: None,
        }
    }

    pub fn overwrite(&mut self, range: Range<usize>, replacement: impl Into<String>) {
        self.overwrites.push(Edit {
            range,
            replacement: replacement.into(),
        });
    }

    /// Inserts `text` at `offset`. Several inserts at one offset keep their
    /// call order, and all of them land before an overwrite starting there.
    pub fn insert(&mut self, offset: usize, text: impl Into<String>) {
        self.inserts.push((offset, text.into()));
    }

    pub fn append_trimmed(&mut self, text: impl Into<String>) {
        self.appended = Some(text.into());
    }

    pub fn finish(mut self) -> Result<String, PreprocessError> {
        let len = self.source.len();
        let check = |offset: usize| {
            if offset > len || !self.source.is_char_boundary(offset) {
                Err(PreprocessError::EditOutOfBounds { offset, len })
            } else {
                Ok(())
            }
        };
        for edit in &self.overwrites {
            check(edit.range.start)?;
            check(edit.range.end)?;
            if edit.range.start > edit.range.end {
                return Err(PreprocessError::EditOutOfBounds {
                    offset: edit.range.start,
                    len,
                });
            }
        }
        for (offset, _) in &self.inserts {
            check(*offset)?;
        }

        self.overwrites.sort_by_key(|edit| edit.range.start);
        for pair in self.overwrites.windows(2) {
            if pair[0].range.end > pair[1].range.start {
                return Err(PreprocessError::SpliceConflict {
                    first: pair[0].range.clone(),
                    second: pair[1].range.clone(),
                });
            }
        }
        for (offset, _) in &self.inserts {
            if let Some(edit) = self
                .overwrites
                .iter()
                .find(|edit| edit.range.start < *offset && *offset < edit.range.end)
            {
                return Err(PreprocessError::SpliceConflict {
                    first: edit.range.clone(),
                    second: *offset..*offset,
                });
            }
        }

        self.inserts.sort_by_key(|(offset, _)| *offset);
        let mut out = String::with_capacity(len);
        let mut cursor = 0usize;
        let mut inserts = self.inserts.iter().peekable();

        for edit in &self.overwrites {
            while let Some((offset, text)) =
                inserts.next_if(|(offset, _)| *offset <= edit.range.start)
            {
                out.push_str(&self.source[cursor..*offset]);
                out.push_str(text);
                cursor = *offset;
            }
            out.push_str(&self.source[cursor..edit.range.start]);
            out.push_str(&edit.replacement);
            cursor = edit.range.end;
        }
        for (offset, text) in inserts {
            out.push_str(&self.source[cursor..*offset]);
            out.push_str(text);
            cursor = *offset;
        }
        out.push_str(&self.source[cursor..]);

        if let Some(appended) = self.appended {
            out.truncate(out.trim_end().len());
            out.push_str(&appended);
        }
        Ok(out)
    }
}

pub fn inject_styles(splice: &mut Splice<'_>, styles: &[StyleBlock], css: &str) {
    if styles.is_empty() {
        splice.append_trimmed(format!("\n\n<style>\n{}</style>", css));
        return;
    }
    for style in styles {
        splice.insert(style.content_start, format!("\n{}", css));
    }
}
