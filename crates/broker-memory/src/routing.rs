/// Whether `routing_key` matches the AMQP topic `binding` key.
///
/// Words are separated by `.`; `*` matches exactly one word and `#` matches zero
/// or more words.
pub fn binding_matches(binding: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = binding.split('.').collect();
    let words: Vec<&str> = routing_key.split('.').collect();

    matches(&pattern, &words)
}

fn matches(pattern: &[&str], words: &[&str]) -> bool {
    match (pattern.split_first(), words.split_first()) {
        (None, None) => true,
        (Some((first, rest)), _) if *first == "#" => {
            matches(rest, words) || (!words.is_empty() && matches(pattern, &words[1..]))
        }
        (None, Some(_)) | (Some(_), None) => false,
        (Some((first, rest)), Some((word, remaining))) => {
            (*first == "*" || first == word) && matches(rest, remaining)
        }
    }
}
