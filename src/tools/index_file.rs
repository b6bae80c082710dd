use std::fs;
use std::io;
use std::path::Path;

/// One arc second in degrees
pub const DEFAULT_RESOLUTION: f64 = 0.000277777777777;

/// Replace every `dx = ` and `dy = ` line of a geogrid index file.
///
/// Returns the new text and the number of replaced lines.
pub fn rewrite_resolution(text: &str, resolution: f64) -> (String, usize) {
    let mut replaced = 0;
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let key = if line.contains("dx = ") {
            Some("dx")
        } else if line.contains("dy = ") {
            Some("dy")
        } else {
            None
        };
        match key {
            Some(key) => {
                out.push_str(&format!("{} = {:.15}\n", key, resolution));
                replaced += 1;
            }
            None => out.push_str(line),
        }
    }
    (out, replaced)
}

/// Rewrite the resolution of an index file in place
pub fn fix_index_file(path: &Path, resolution: f64) -> io::Result<usize> {
    let text = fs::read_to_string(path)?;
    let (fixed, replaced) = rewrite_resolution(&text, resolution);
    fs::write(path, fixed)?;
    Ok(replaced)
}
