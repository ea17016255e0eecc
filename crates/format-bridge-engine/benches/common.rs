// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
// See: https://users.rust-lang.org/t/cargo-rustc-benches-awarnings/110111/2
use format_bridge_engine::Replacement;

#[allow(dead_code)]
pub fn generate_source(functions: usize) -> String {
    let base = "int  add(int  a,int b){\n    return a  +  b;\n}\n\nstatic  const char *name = \"x\";\n\n";
    base.repeat(functions)
}

/// One replacement per run of two spaces, the shape a formatter produces
#[allow(dead_code)]
pub fn collapse_double_spaces(source: &str) -> Vec<Replacement> {
    source
        .match_indices("  ")
        .map(|(offset, _)| Replacement::new(offset, 2, " "))
        .collect()
}

#[allow(dead_code)]
pub fn to_replacements_xml(replacements: &[Replacement]) -> String {
    let mut xml = String::from(
        "<?xml version='1.0'?>\n<replacements xml:space='preserve' incomplete_format='false'>\n<cursor>0</cursor>\n",
    );
    for r in replacements {
        xml.push_str(&format!(
            "<replacement offset='{}' length='{}'>{}</replacement>\n",
            r.offset, r.length, r.value
        ));
    }
    xml.push_str("</replacements>\n");
    xml
}
