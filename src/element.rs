use std::fmt::Debug;

/// A value that can be stored in a replicated set. Elements are used as table keys, hence the
/// ordering requirement. Empty elements are rejected by every set operation.
pub trait Element: Ord + Clone + Debug {
    fn is_empty(&self) -> bool;
}

impl Element for String {
    fn is_empty(&self) -> bool { String::is_empty(self) }
}

impl<'a> Element for &'a str {
    fn is_empty(&self) -> bool { str::is_empty(self) }
}

impl Element for Vec<u8> {
    fn is_empty(&self) -> bool { Vec::is_empty(self) }
}

macro_rules! never_empty {
    ($($t:ty),*) => {
        $(impl Element for $t {
            #[inline]
            fn is_empty(&self) -> bool { false }
        })*
    };
}

never_empty!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, char);

#[cfg(test)]
mod test {
    use crate::element::Element;

    #[test]
    fn element_emptiness() {
        assert!(Element::is_empty(&""));
        assert!(!Element::is_empty(&"x"));
        assert!(Element::is_empty(&String::new()));
        assert!(Element::is_empty(&Vec::<u8>::new()));
        assert!(!Element::is_empty(&vec![0u8]));
        assert!(!Element::is_empty(&0u32));
    }
}
