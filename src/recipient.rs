use std::fmt;

use itertools::Itertools;

use crate::content::Content;

// Characters that force a display name into an RFC 5322 quoted-string.
const SPECIALS: &[char] = &[
    '(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '.', '"',
];

/// Split a combined `"Name <address>"` string on the first `<`.
///
/// Without a `<` the whole trimmed input is the address and the name is
/// empty. No mail-syntax validation happens here; any string passes.
pub fn emailsplit(input: &str) -> (String, String) {
    match input.split_once('<') {
        Some((name, rest)) => {
            let address = rest.trim().trim_end_matches('>').trim_end();
            (name.trim().to_string(), address.to_string())
        }
        None => (String::new(), input.trim().to_string()),
    }
}

/// Format a (name, address) pair the way RFC 5322 wants it on the wire:
/// bare address for an empty name, `Name <address>` otherwise, with the
/// name quoted and escaped when it contains specials.
pub fn formataddr(name: &str, address: &str) -> String {
    if name.is_empty() {
        return address.to_string();
    }
    if name.contains(SPECIALS) {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{}\" <{}>", escaped, address)
    } else {
        format!("{} <{}>", name, address)
    }
}

/// A display name plus address.
///
/// Immutable once built. The address is carried through untouched; the
/// mail collaborator is the first place syntax is enforced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    name: String,
    address: String,
}

impl Recipient {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Recipient {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Parse a combined `"Name <address>"` or bare `"address"` string.
    pub fn parse(input: &str) -> Self {
        let (name, address) = emailsplit(input);
        Recipient { name, address }
    }

    /// Decode raw byte input as UTF-8, then parse.
    pub fn from_content(content: &Content) -> Self {
        Recipient::parse(&content.to_text())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn formatted(&self) -> String {
        formataddr(&self.name, &self.address)
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

impl From<&str> for Recipient {
    fn from(input: &str) -> Self {
        Recipient::parse(input)
    }
}

impl From<String> for Recipient {
    fn from(input: String) -> Self {
        Recipient::parse(&input)
    }
}

impl<N: Into<String>, A: Into<String>> From<(N, A)> for Recipient {
    fn from((name, address): (N, A)) -> Self {
        Recipient::new(name, address)
    }
}

/// Ordered list of recipients. Order is preserved from the input and
/// duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientList(Vec<Recipient>);

impl RecipientList {
    pub fn new() -> Self {
        RecipientList(Vec::new())
    }

    /// Parse a comma separated string of recipients. Empty or
    /// whitespace-only input yields the empty list.
    pub fn parse(input: &str) -> Self {
        if input.trim().is_empty() {
            return RecipientList::new();
        }
        RecipientList(input.split(',').map(Recipient::parse).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Recipient> {
        self.0.iter()
    }

    /// Concatenate two lists, preserving combined order.
    pub fn concat(&self, other: &RecipientList) -> RecipientList {
        let mut joined = self.0.clone();
        joined.extend(other.0.iter().cloned());
        RecipientList(joined)
    }

    /// The formatted string of each element, in order.
    pub fn formatted(&self) -> Vec<String> {
        self.0.iter().map(Recipient::formatted).collect()
    }
}

impl fmt::Display for RecipientList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.iter().map(Recipient::formatted).join(", "))
    }
}

impl From<&str> for RecipientList {
    fn from(input: &str) -> Self {
        RecipientList::parse(input)
    }
}

impl From<String> for RecipientList {
    fn from(input: String) -> Self {
        RecipientList::parse(&input)
    }
}

impl<T: Into<Recipient>> From<Vec<T>> for RecipientList {
    fn from(items: Vec<T>) -> Self {
        items.into_iter().map(Into::into).collect()
    }
}

impl<T: Into<Recipient>, const N: usize> From<[T; N]> for RecipientList {
    fn from(items: [T; N]) -> Self {
        items.into_iter().map(Into::into).collect()
    }
}

impl FromIterator<Recipient> for RecipientList {
    fn from_iter<I: IntoIterator<Item = Recipient>>(iter: I) -> Self {
        RecipientList(iter.into_iter().collect())
    }
}

impl IntoIterator for RecipientList {
    type Item = Recipient;
    type IntoIter = std::vec::IntoIter<Recipient>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecipientList {
    type Item = &'a Recipient;
    type IntoIter = std::slice::Iter<'a, Recipient>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
