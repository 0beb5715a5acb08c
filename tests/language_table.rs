use multilingual_m2m::language_table::{
    order_records, read_language_records, read_language_records_xlsx, romanize,
    write_language_table, LanguageRecord, LanguageTableConfig,
};
use multilingual_m2m::multilingual::{LanguageFamilies, LanguageFamily};
use multilingual_m2m::MultilingualError;
use rust_xlsxwriter::Workbook;
use std::path::Path;

const TABLE: &str = "\
语言英文,语言缩写,语言中文,备注
Afrikaans,af,南非荷兰语,
German,de,德语,
Japanese,ja,日语,
English,en,英语,
Dutch,nl,荷兰语,
Chinese,zh,中文,
Swahili,sw,斯瓦希里语,
Dutch (Belgium),nl,弗拉芒语,
";

fn families() -> LanguageFamilies {
    LanguageFamilies::new(vec![
        LanguageFamily {
            name: "family_1".to_string(),
            languages: vec!["en".to_string(), "de".to_string(), "nl".to_string()],
        },
        LanguageFamily {
            name: "family_7".to_string(),
            languages: vec!["sw".to_string()],
        },
        LanguageFamily {
            name: "family_3".to_string(),
            languages: vec!["ja".to_string(), "nl".to_string()],
        },
    ])
}

fn codes(records: &[LanguageRecord]) -> Vec<&str> {
    records.iter().map(|record| record.abs.as_str()).collect()
}

#[test]
fn language_table_romanization() {
    assert_eq!(romanize("德语"), "deyu");
    assert_eq!(romanize("南非荷兰语"), "nanfeihelanyu");
    assert_eq!(romanize("N'Ko语"), "N'Koyu");
    assert_eq!(romanize(""), "");
}

#[test]
fn language_table_read_records() -> anyhow::Result<()> {
    let records = read_language_records(TABLE.as_bytes())?;

    assert_eq!(records.len(), 8);
    assert_eq!(
        records[1],
        LanguageRecord {
            en: "German".to_string(),
            abs: "de".to_string(),
            chinese: "德语".to_string(),
            pinyin: "deyu".to_string(),
        }
    );

    let missing_column = read_language_records("语言英文,语言缩写\nGerman,de\n".as_bytes());
    assert!(matches!(missing_column, Err(MultilingualError::ParseError(_))));
    Ok(())
}

fn write_workbook(path: &Path, rows: &[&[&str]]) -> anyhow::Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    for (row, cells) in rows.iter().enumerate() {
        for (col, cell) in cells.iter().enumerate() {
            if !cell.is_empty() {
                worksheet.write_string(row as u32, col as u16, *cell)?;
            }
        }
    }
    workbook.save(path)?;
    Ok(())
}

#[test]
fn language_table_read_xlsx_records() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    let path = directory.path().join("langid2lang_chinese.xlsx");
    let rows = TABLE
        .lines()
        .map(|line| line.split(',').collect::<Vec<&str>>())
        .collect::<Vec<Vec<&str>>>();
    let mut rows = rows.iter().map(Vec::as_slice).collect::<Vec<&[&str]>>();
    rows.insert(3, &["", "", "", "empty row"]);
    rows.push(&[" Zulu ", "zu", "祖鲁语", ""]);
    write_workbook(&path, &rows)?;

    let records = read_language_records_xlsx(&path)?;

    assert_eq!(records.len(), 9);
    assert_eq!(records, {
        let mut expected = read_language_records(TABLE.as_bytes())?;
        expected.push(LanguageRecord::new("Zulu", "zu", "祖鲁语"));
        expected
    });
    assert_eq!(records[8].pinyin, "zuluyu");

    let path = directory.path().join("missing_column.xlsx");
    write_workbook(&path, &[&["语言英文", "语言缩写"], &["German", "de"]])?;
    assert!(matches!(
        read_language_records_xlsx(&path),
        Err(MultilingualError::ParseError(_))
    ));
    assert!(read_language_records_xlsx(directory.path().join("absent.xlsx")).is_err());
    Ok(())
}

#[test]
fn language_table_target_languages() {
    let config = LanguageTableConfig {
        families: families(),
        ..Default::default()
    };

    assert_eq!(config.target_languages(), vec!["nl", "ja"]);

    let config = LanguageTableConfig {
        max_family_rank: 8,
        ..config
    };
    assert_eq!(config.target_languages(), vec!["nl", "sw", "ja"]);
}

#[test]
fn language_table_ordering() -> anyhow::Result<()> {
    let records = read_language_records(TABLE.as_bytes())?;
    let config = LanguageTableConfig {
        families: families(),
        ..Default::default()
    };

    let ordered = order_records(&records, &config);

    assert_eq!(
        codes(&ordered),
        vec!["en", "zh", "de", "nl", "ja", "af", "sw"]
    );
    assert_eq!(ordered[3].en, "Dutch");
    Ok(())
}

#[test]
fn language_table_output() -> anyhow::Result<()> {
    let records = vec![
        LanguageRecord::new("German", "de", "德语"),
        LanguageRecord::new("English", "en", "英语"),
        LanguageRecord {
            en: "N'Ko \"Manding\"".to_string(),
            abs: "nqo".to_string(),
            chinese: "𠀀语".to_string(),
            pinyin: "yu".to_string(),
        },
    ];
    let mut output = Vec::new();

    write_language_table(&mut output, &records)?;

    let output = String::from_utf8(output)?;
    assert_eq!(
        output,
        concat!(
            "const languageTable = [ \n",
            r#"{"en": "German", "abs": "de", "chinese": "\u5fb7\u8bed", "pinyin": "deyu"},"#,
            "\n",
            r#"{"en": "English", "abs": "en", "chinese": "\u82f1\u8bed", "pinyin": "yingyu"},"#,
            "\n",
            r#"{"en": "N'Ko \"Manding\"", "abs": "nqo", "#,
            r#""chinese": "\ud840\udc00\u8bed", "pinyin": "yu"},"#,
            "\n",
            "];\nexport { languageTable };"
        )
    );
    assert!(output.is_ascii());
    Ok(())
}
