use std::io::Read;
use std::path::Path;

use log::warn;

use dicom_rt_viewer::dict::{FileTagDictionary, NameResolver};
use dicom_rt_viewer::render::{self, GroupContent};
use dicom_rt_viewer::util::{format_file_size, format_tag};
use dicom_rt_viewer::{parser, CommonResult};

const TAG_MAPPING_FILE: &str = "./tag_mapping.txt";

fn main() -> CommonResult<()> {
    env_logger::init();

    let file_path = std::env::args()
        .nth(1)
        .ok_or("usage: dicom_rt_viewer <file.dcm>")?;

    let mut file = std::fs::File::open(&file_path)?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;

    let table = parser::parse(&buffer)?;

    let external = load_external_dictionary();
    let names = match &external {
        Some(dictionary) => NameResolver::with_external(dictionary),
        None => NameResolver::builtin_only(),
    };

    println!("File: {}", file_path);
    println!("Size: {}", format_file_size(buffer.len() as u64));
    println!("Elements: {}", table.len());

    print_group("General", render::general_group(&table, &buffer));
    print_group("RT Plan", render::rt_plan_group(&table, &buffer));
    print_group("RT Dose", render::rt_dose_group(&table, &buffer));
    print_group("RT Structure", render::rt_struct_group(&table, &buffer));

    println!();
    println!("== All Tags ==");
    for row in render::all_rows(&table, &buffer, &names) {
        println!("{}  {}  {}", row.tag, row.name, row.value);
    }

    Ok(())
}

fn load_external_dictionary() -> Option<FileTagDictionary> {
    let path = Path::new(TAG_MAPPING_FILE);
    if !path.exists() {
        return None;
    }
    match FileTagDictionary::load(path) {
        Ok(dictionary) => Some(dictionary),
        Err(error) => {
            warn!("could not load {TAG_MAPPING_FILE}: {error}");
            None
        }
    }
}

fn print_group(title: &str, content: GroupContent) {
    println!();
    println!("== {title} ==");
    match content {
        GroupContent::EmptyState(message) => println!("{message}"),
        GroupContent::Rows(rows) => {
            for row in rows {
                println!("{}", row.label);
                for line in render::format_value(&row.value).lines() {
                    println!("  {line}");
                }
                println!("  Tag: {}", format_tag(row.tag));
            }
        }
    }
}
