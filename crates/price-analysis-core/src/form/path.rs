use std::fmt;
use std::str::FromStr;

/// Addressable location in the form tree.
///
/// Paths compare by the cell they name: building the same cell twice, in any order, yields
/// equal and equally hashed values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldPath {
    /// A top-level field, e.g. `final_value`.
    Scalar { field: String },
    /// A field of one record of an array, e.g. `scores.2.weight`.
    Item {
        array: String,
        index: usize,
        field: String,
    },
    /// A field of a record nested inside an array record, e.g. `scores.2.surveys.1.survey_score`.
    Nested {
        array: String,
        index: usize,
        nested: String,
        position: usize,
        field: String,
    },
}

impl FieldPath {
    pub fn scalar(field: &str) -> Self {
        FieldPath::Scalar {
            field: field.to_string(),
        }
    }

    pub fn item(array: &str, index: usize, field: &str) -> Self {
        FieldPath::Item {
            array: array.to_string(),
            index,
            field: field.to_string(),
        }
    }

    pub fn nested(array: &str, index: usize, nested: &str, position: usize, field: &str) -> Self {
        FieldPath::Nested {
            array: array.to_string(),
            index,
            nested: nested.to_string(),
            position,
            field: field.to_string(),
        }
    }

    /// Array this path indexes into, if any.
    pub fn array(&self) -> Option<&str> {
        match self {
            FieldPath::Scalar { .. } => None,
            FieldPath::Item { array, .. } | FieldPath::Nested { array, .. } => Some(array),
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            FieldPath::Scalar { .. } => None,
            FieldPath::Item { index, .. } | FieldPath::Nested { index, .. } => Some(*index),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            FieldPath::Scalar { field }
            | FieldPath::Item { field, .. }
            | FieldPath::Nested { field, .. } => field,
        }
    }

    pub fn segments(&self) -> Vec<Segment<'_>> {
        match self {
            FieldPath::Scalar { field } => vec![Segment::Key(field)],
            FieldPath::Item {
                array,
                index,
                field,
            } => vec![
                Segment::Key(array),
                Segment::Index(*index),
                Segment::Key(field),
            ],
            FieldPath::Nested {
                array,
                index,
                nested,
                position,
                field,
            } => vec![
                Segment::Key(array),
                Segment::Index(*index),
                Segment::Key(nested),
                Segment::Index(*position),
                Segment::Key(field),
            ],
        }
    }

    /// Re-addresses this path after record `removed` left `array`.
    ///
    /// Returns `None` when the path pointed into the removed record. Paths into later records
    /// move down by one so they keep naming the same record.
    pub fn after_removal(&self, array: &str, removed: usize) -> Option<FieldPath> {
        match self.index() {
            Some(index) if self.array() == Some(array) => {
                if index == removed {
                    return None;
                }
                let mut moved = self.clone();
                if index > removed {
                    moved.set_index(index - 1);
                }
                Some(moved)
            }
            _ => Some(self.clone()),
        }
    }

    /// Same as [`after_removal`](Self::after_removal) for the nested position, used when a
    /// column is dropped from every record of `array`.
    pub fn after_nested_removal(&self, array: &str, nested: &str, removed: usize) -> Option<FieldPath> {
        match self {
            FieldPath::Nested {
                array: a,
                nested: n,
                position,
                ..
            } if a == array && n == nested => {
                if *position == removed {
                    return None;
                }
                let mut moved = self.clone();
                if let FieldPath::Nested { position, .. } = &mut moved {
                    if *position > removed {
                        *position -= 1;
                    }
                }
                Some(moved)
            }
            _ => Some(self.clone()),
        }
    }

    fn set_index(&mut self, value: usize) {
        match self {
            FieldPath::Scalar { .. } => {}
            FieldPath::Item { index, .. } | FieldPath::Nested { index, .. } => *index = value,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .segments()
            .into_iter()
            .map(|segment| match segment {
                Segment::Key(key) => key.to_string(),
                Segment::Index(index) => index.to_string(),
            })
            .collect();
        write!(f, "{}", rendered.join("."))
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = raw.trim().split('.').collect();
        match parts.as_slice() {
            [field] => Ok(FieldPath::scalar(identifier(field)?)),
            [array, index, field] => Ok(FieldPath::item(
                identifier(array)?,
                position(index)?,
                identifier(field)?,
            )),
            [array, index, nested, pos, field] => Ok(FieldPath::nested(
                identifier(array)?,
                position(index)?,
                identifier(nested)?,
                position(pos)?,
                identifier(field)?,
            )),
            _ => Err(PathError::Shape(raw.to_string())),
        }
    }
}

fn identifier(raw: &str) -> Result<&str, PathError> {
    let valid = !raw.is_empty()
        && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !raw.chars().all(|c| c.is_ascii_digit());
    if valid {
        Ok(raw)
    } else {
        Err(PathError::Identifier(raw.to_string()))
    }
}

fn position(raw: &str) -> Result<usize, PathError> {
    raw.parse::<usize>()
        .map_err(|_| PathError::Index(raw.to_string()))
}

/// One step of a path through the JSON form tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("'{0}' is not a field path (expected field, array.N.field or array.N.nested.N.field)")]
    Shape(String),
    #[error("'{0}' is not a valid field identifier")]
    Identifier(String),
    #[error("'{0}' is not a valid record index")]
    Index(String),
}

/// A [`FieldPath`] whose record index is filled in per live record at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathTemplate {
    Scalar { field: String },
    Item { array: String, field: String },
    Nested {
        array: String,
        nested: String,
        position: usize,
        field: String,
    },
}

impl PathTemplate {
    pub fn scalar(field: &str) -> Self {
        PathTemplate::Scalar {
            field: field.to_string(),
        }
    }

    pub fn item(array: &str, field: &str) -> Self {
        PathTemplate::Item {
            array: array.to_string(),
            field: field.to_string(),
        }
    }

    pub fn nested(array: &str, nested: &str, position: usize, field: &str) -> Self {
        PathTemplate::Nested {
            array: array.to_string(),
            nested: nested.to_string(),
            position,
            field: field.to_string(),
        }
    }

    pub fn array(&self) -> Option<&str> {
        match self {
            PathTemplate::Scalar { .. } => None,
            PathTemplate::Item { array, .. } | PathTemplate::Nested { array, .. } => Some(array),
        }
    }

    /// Binds the open record index. Scalar templates ignore it.
    pub fn bind(&self, index: usize) -> FieldPath {
        match self {
            PathTemplate::Scalar { field } => FieldPath::scalar(field),
            PathTemplate::Item { array, field } => FieldPath::item(array, index, field),
            PathTemplate::Nested {
                array,
                nested,
                position,
                field,
            } => FieldPath::nested(array, index, nested, *position, field),
        }
    }

    /// Index-free key naming every cell this template can produce.
    pub fn shape(&self) -> String {
        match self {
            PathTemplate::Scalar { field } => field.clone(),
            PathTemplate::Item { array, field } => format!("{array}.*.{field}"),
            PathTemplate::Nested {
                array,
                nested,
                position,
                field,
            } => format!("{array}.*.{nested}.{position}.{field}"),
        }
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.shape())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn same_cell_yields_equal_paths() {
        let built = FieldPath::nested("scores", 2, "surveys", 1, "survey_score");
        let parsed: FieldPath = "scores.2.surveys.1.survey_score".parse().expect("parses");
        assert_eq!(built, parsed);

        let mut seen = HashSet::new();
        seen.insert(built);
        assert!(seen.contains(&parsed));
        assert_eq!(parsed.to_string(), "scores.2.surveys.1.survey_score");
    }

    #[test]
    fn parse_rejects_typos_at_construction() {
        assert!(matches!(
            "scores.0.we-ight".parse::<FieldPath>(),
            Err(PathError::Identifier(_))
        ));
        assert!(matches!(
            "scores.x.weight".parse::<FieldPath>(),
            Err(PathError::Index(_))
        ));
        assert!(matches!(
            "scores.1".parse::<FieldPath>(),
            Err(PathError::Shape(_))
        ));
        assert!(matches!("7".parse::<FieldPath>(), Err(PathError::Identifier(_))));
    }

    #[test]
    fn removal_shifts_later_records() {
        let path = FieldPath::item("scores", 3, "weight");
        assert_eq!(
            path.after_removal("scores", 1),
            Some(FieldPath::item("scores", 2, "weight"))
        );
        assert_eq!(path.after_removal("scores", 3), None);
        assert_eq!(path.after_removal("calculations", 0), Some(path.clone()));

        let cell = FieldPath::nested("scores", 0, "surveys", 2, "survey_score");
        assert_eq!(
            cell.after_nested_removal("scores", "surveys", 0),
            Some(FieldPath::nested("scores", 0, "surveys", 1, "survey_score"))
        );
        assert_eq!(cell.after_nested_removal("scores", "surveys", 2), None);
    }

    #[test]
    fn templates_bind_and_share_shapes() {
        let template = PathTemplate::nested("scores", "surveys", 1, "weighted_survey_score");
        assert_eq!(
            template.bind(4),
            FieldPath::nested("scores", 4, "surveys", 1, "weighted_survey_score")
        );
        assert_eq!(template.shape(), "scores.*.surveys.1.weighted_survey_score");
        assert_eq!(PathTemplate::scalar("final_value").bind(9), FieldPath::scalar("final_value"));
    }
}
