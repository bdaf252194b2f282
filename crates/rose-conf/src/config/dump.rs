use super::{sort_settings, ConfigNode, CHAR_ASSIGN};
use crate::env::env_var_escape;
use std::cmp::Ordering;
use std::fmt::Write;

type SortFn = fn(&str, &str) -> Ordering;

/// Writes a [ConfigNode] in the rose configuration format
///
/// ```
/// use rose_conf::config::{ConfigDumper, ConfigNode, State};
///
/// let mut node = ConfigNode::new();
/// node.set(&["foo", "bar"], "Bar");
/// node.set_with(&["foo", "baz"], "Baz", Some(State::UserIgnored), Some(vec!["Currently ignored!".into()]));
///
/// assert_eq!(
///     ConfigDumper::default().dump_to_string(&node),
///     "[foo]\nbar=Bar\n#Currently ignored!\n!baz=Baz\n"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct ConfigDumper {
    pub sort_sections: SortFn,
    pub sort_options: SortFn,
    /// Escape `$NAME` and `${NAME}` in values
    pub env_escape: bool,
    /// Write `[]` before root options
    pub concat_mode: bool,
}

impl Default for ConfigDumper {
    fn default() -> Self {
        Self {
            sort_sections: sort_settings,
            sort_options: sort_settings,
            env_escape: false,
            concat_mode: false,
        }
    }
}

impl ConfigDumper {
    pub fn dump_to_string(&self, root: &ConfigNode) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.dump(root, &mut out);
        out
    }

    pub fn dump_to_file(&self, root: &ConfigNode, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        tracing::info!(path=%path.display(), "writing file");
        std::fs::write(path, self.dump_to_string(root))
    }

    pub fn dump(&self, root: &ConfigNode, out: &mut impl Write) -> std::fmt::Result {
        let mut blank = "";
        if !root.comments.is_empty() {
            for comment in &root.comments {
                writeln!(out, "#{comment}")?;
            }
            blank = "\n";
        }

        let Some(map) = root.as_map() else {
            return Ok(());
        };

        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort_by(|a, b| (self.sort_sections)(a, b));
        let (option_keys, section_keys): (Vec<&String>, Vec<&String>) =
            keys.into_iter().partition(|key| map[*key].as_leaf().is_some());

        if !option_keys.is_empty() {
            out.write_str(blank)?;
            blank = "\n";
            if self.concat_mode {
                out.write_str("[]\n")?;
            }
            for key in option_keys {
                self.dump_option(key, &map[key], out)?;
            }
        }

        for section_key in section_keys {
            let section = &map[section_key];
            out.write_str(blank)?;
            blank = "\n";
            for comment in &section.comments {
                writeln!(out, "#{comment}")?;
            }
            writeln!(out, "[{}{section_key}]", section.state)?;

            let Some(options) = section.as_map() else {
                continue;
            };
            let mut keys: Vec<&String> = options.keys().collect();
            keys.sort_by(|a, b| (self.sort_options)(a, b));
            for key in keys {
                if options[key].as_leaf().is_some() {
                    self.dump_option(key, &options[key], out)?;
                }
            }
        }

        Ok(())
    }

    fn dump_option(&self, key: &str, node: &ConfigNode, out: &mut impl Write) -> std::fmt::Result {
        let value = node.as_leaf().unwrap_or_default();
        let escape = |line: &str| {
            if self.env_escape {
                env_var_escape(line)
            } else {
                line.to_string()
            }
        };

        for comment in &node.comments {
            writeln!(out, "#{comment}")?;
        }

        let mut lines = value.split('\n');
        let first = lines.next().unwrap_or_default();
        writeln!(out, "{}{key}{CHAR_ASSIGN}{}", node.state, escape(first))?;

        let indent = " ".repeat(node.state.prefix().len() + key.len());
        for line in lines {
            writeln!(out, "{indent}{CHAR_ASSIGN}{}", escape(line))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::State;

    #[test]
    fn layout() {
        let node: ConfigNode = "#top\n\nz=1\na=2\n\n[!bar(10)]\nx=multi\n  =line\n[bar(2)]\n!!y=3\n"
            .parse()
            .unwrap();

        insta::assert_snapshot!(node.dump(), @r"
        #top

        a=2
        z=1

        [bar(2)]
        !!y=3

        [!bar(10)]
        x=multi
         =line
        ");
    }

    #[test]
    fn env_escape() {
        let mut node = ConfigNode::new();
        node.set_with(&["env", "PATH"], "$HOME/bin", Some(State::Normal), None);
        let dumper = ConfigDumper {
            env_escape: true,
            ..Default::default()
        };
        assert_eq!(dumper.dump_to_string(&node), "[env]\nPATH=\\$HOME/bin\n");
    }

    #[test]
    fn concat_mode() {
        let mut node = ConfigNode::new();
        node.set(&["a"], "1");
        let dumper = ConfigDumper {
            concat_mode: true,
            ..Default::default()
        };
        assert_eq!(dumper.dump_to_string(&node), "[]\na=1\n");
    }
}
