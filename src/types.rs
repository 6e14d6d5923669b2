use std::fmt;

/// A system user, given either by login name or by numeric uid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum User {
    Name(String),
    Id(u32),
}

/// A system group, given either by name or by numeric gid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Group {
    Name(String),
    Id(u32),
}

/// Strings made only of digits are taken as numeric ids, like `chown` does.
impl From<&str> for User {
    fn from(s: &str) -> Self {
        match s.parse::<u32>() {
            Ok(id) => User::Id(id),
            Err(_) => User::Name(s.to_owned()),
        }
    }
}

impl From<String> for User {
    fn from(s: String) -> Self {
        User::from(s.as_str())
    }
}

impl From<u32> for User {
    fn from(id: u32) -> Self {
        User::Id(id)
    }
}

impl From<&str> for Group {
    fn from(s: &str) -> Self {
        match s.parse::<u32>() {
            Ok(id) => Group::Id(id),
            Err(_) => Group::Name(s.to_owned()),
        }
    }
}

impl From<String> for Group {
    fn from(s: String) -> Self {
        Group::from(s.as_str())
    }
}

impl From<u32> for Group {
    fn from(id: u32) -> Self {
        Group::Id(id)
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            User::Name(name) => f.write_str(name),
            User::Id(id) => write!(f, "{id}"),
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Group::Name(name) => f.write_str(name),
            Group::Id(id) => write!(f, "{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_become_ids() {
        assert_eq!(User::from("1000"), User::Id(1000));
        assert_eq!(Group::from("0"), Group::Id(0));
        assert_eq!(User::from("www-data"), User::Name("www-data".into()));
        assert_eq!(Group::from(String::from("-1")), Group::Name("-1".into()));
    }
}
