//! Build script for embedding the built-in songs
//!
//! Reads `songs/builtin.songs` (one `name:note,note,...` song per line) and
//! generates a static table that `song::builtin_songs` turns into `Song`s.

use std::env;
use std::fs::{read_to_string, File};
use std::io::Write;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=songs/builtin.songs");

    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("builtin_songs.rs");
    let mut out = File::create(&dest_path).unwrap();

    let source = read_to_string("songs/builtin.songs").unwrap();
    let mut songs = Vec::new();

    for (line_no, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (name, body) = line
            .split_once(':')
            .unwrap_or_else(|| panic!("songs/builtin.songs:{}: expected name:notes", line_no + 1));
        let notes: Vec<u8> = body
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| {
                item.parse::<u8>().unwrap_or_else(|_| {
                    panic!("songs/builtin.songs:{}: bad note {:?}", line_no + 1, item)
                })
            })
            .collect();
        if notes.is_empty() {
            panic!("songs/builtin.songs:{}: song has no notes", line_no + 1);
        }
        songs.push((name.trim().to_string(), notes));
    }

    if songs.is_empty() {
        panic!("No built-in songs found in songs/builtin.songs!");
    }

    writeln!(out, "pub static BUILTIN_SONGS: &[(&str, &[u8])] = &[").unwrap();
    for (name, notes) in &songs {
        let list: Vec<String> = notes.iter().map(|n| n.to_string()).collect();
        writeln!(out, "    ({:?}, &[{}]),", name, list.join(", ")).unwrap();
    }
    writeln!(out, "];").unwrap();
}
