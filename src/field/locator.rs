use super::{FieldId, FieldNode};

/// Path segment that continues resolution from the current node's parent.
pub const PARENT_ESCAPE: &str = "..";

/// A `/`-delimited field path split into its segments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The last segment, i.e. the name of the field the path points at.
    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        FieldPath::parse(path)
    }
}

impl From<&String> for FieldPath {
    fn from(path: &String) -> Self {
        FieldPath::parse(path)
    }
}

impl From<&FieldPath> for FieldPath {
    fn from(path: &FieldPath) -> Self {
        path.clone()
    }
}

impl From<Vec<String>> for FieldPath {
    fn from(segments: Vec<String>) -> Self {
        Self { segments }
    }
}

impl From<&[&str]> for FieldPath {
    fn from(segments: &[&str]) -> Self {
        Self {
            segments: segments.iter().map(|segment| segment.to_string()).collect(),
        }
    }
}

impl<const N: usize> From<[&str; N]> for FieldPath {
    fn from(segments: [&str; N]) -> Self {
        FieldPath::from(&segments[..])
    }
}

/// Resolve `path` against `root`.
///
/// Segments are matched left to right against the declared field names of
/// the children. A list child may also be matched by its collection name, in
/// which case it is returned immediately since list items are not
/// addressable. A leading [`PARENT_ESCAPE`] continues from the parent.
/// `None` means the field is not present; callers treat that as an optional
/// feature being absent.
pub fn locate<H, P>(host: &H, path: P, root: FieldId) -> Option<FieldId>
where
    H: FieldNode + ?Sized,
    P: Into<FieldPath>,
{
    let path = path.into();
    resolve(host, path.segments(), root)
}

fn resolve<H>(host: &H, segments: &[String], root: FieldId) -> Option<FieldId>
where
    H: FieldNode + ?Sized,
{
    let (first, rest) = segments.split_first()?;

    if first == PARENT_ESCAPE {
        let parent = host.parent(root)?;
        return resolve(host, rest, parent);
    }

    for &child in host.children(root)? {
        if host.field_name(child) == Some(first.as_str()) {
            if rest.is_empty() {
                return Some(child);
            }
            return resolve(host, rest, child);
        }
        if host.list_name(child) == Some(first.as_str()) {
            return Some(child);
        }
    }

    None
}
