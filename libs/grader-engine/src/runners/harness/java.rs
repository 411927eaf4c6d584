use super::{Harness, HarnessFile, HarnessPlan, CODE_DIR};
use grader_common::types::TestCase;
use regex::Regex;
use std::sync::LazyLock;

const HARNESS_CLASS: &str = "GraderHarness";

const HARNESS_HEAD: &str = r#"import java.lang.reflect.Array;
import java.util.ArrayList;
import java.util.Collection;
import java.util.List;
import java.util.Map;

public class GraderHarness {
    private static String quote(String s) {
        StringBuilder sb = new StringBuilder("\"");
        for (int i = 0; i < s.length(); i++) {
            char c = s.charAt(i);
            switch (c) {
                case '"': sb.append("\\\""); break;
                case '\\': sb.append("\\\\"); break;
                case '\n': sb.append("\\n"); break;
                case '\r': sb.append("\\r"); break;
                case '\t': sb.append("\\t"); break;
                default:
                    if (c < 0x20) {
                        sb.append(String.format("\\u%04x", (int) c));
                    } else {
                        sb.append(c);
                    }
            }
        }
        return sb.append('"').toString();
    }

    private static String literal(Object value) {
        if (value == null) return "null";
        if (value instanceof Boolean) return value.toString();
        if (value instanceof Double || value instanceof Float) {
            double d = ((Number) value).doubleValue();
            if (Double.isNaN(d)) return "NaN";
            if (Double.isInfinite(d)) return d > 0 ? "Infinity" : "-Infinity";
            return value.toString();
        }
        if (value instanceof Number) return value.toString();
        if (value instanceof CharSequence || value instanceof Character) return quote(value.toString());
        if (value.getClass().isArray()) {
            StringBuilder sb = new StringBuilder("[");
            for (int i = 0; i < Array.getLength(value); i++) {
                if (i > 0) sb.append(',');
                sb.append(literal(Array.get(value, i)));
            }
            return sb.append(']').toString();
        }
        if (value instanceof Collection) {
            StringBuilder sb = new StringBuilder("[");
            boolean first = true;
            for (Object item : (Collection<?>) value) {
                if (!first) sb.append(',');
                first = false;
                sb.append(literal(item));
            }
            return sb.append(']').toString();
        }
        if (value instanceof Map) {
            StringBuilder sb = new StringBuilder("{");
            boolean first = true;
            for (Map.Entry<?, ?> entry : ((Map<?, ?>) value).entrySet()) {
                if (!first) sb.append(',');
                first = false;
                sb.append(quote(String.valueOf(entry.getKey()))).append(':').append(literal(entry.getValue()));
            }
            return sb.append('}').toString();
        }
        return quote(value.toString());
    }

    public static void main(String[] args) throws Exception {
        List<String> results = new ArrayList<>();
"#;

const HARNESS_TAIL: &str = r#"        StringBuilder out = new StringBuilder("[");
        for (int i = 0; i < results.size(); i++) {
            if (i > 0) out.append(',');
            out.append(quote(results.get(i)));
        }
        System.out.println();
        System.out.println(out.append(']').toString());
    }
}
"#;

static PUBLIC_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bpublic\s+(?:(?:final|abstract|static)\s+)*class\s+([A-Za-z_$][A-Za-z0-9_$]*)")
        .expect("valid regex")
});

static ANY_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bclass\s+([A-Za-z_$][A-Za-z0-9_$]*)").expect("valid regex"));

static BARE_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_$][A-Za-z0-9_$]*)\s*\(").expect("valid regex"));

/// Entry-point discovery: the public class if there is one, else the first class
pub fn discover_class(source: &str) -> Option<String> {
    PUBLIC_CLASS
        .captures(source)
        .or_else(|| ANY_CLASS.captures(source))
        .map(|caps| caps[1].to_string())
}

/// `add(1, 2)` becomes `Solution.add(1, 2)`; qualified calls and `new` are left alone
pub fn qualify_input(input: &str, class_name: &str) -> String {
    let input = input.trim().trim_end_matches(';').trim_end();
    match BARE_CALL.captures(input) {
        Some(caps) if &caps[1] != "new" => format!("{}.{}", class_name, input),
        _ => input.to_string(),
    }
}

/// Compiles the submission together with a generated `GraderHarness` class
#[derive(Debug, Default)]
pub struct JavaHarness;

impl JavaHarness {
    pub fn generate(class_name: &str, tests: &[TestCase]) -> String {
        let mut harness = String::from(HARNESS_HEAD);
        for test in tests {
            harness.push_str(&format!(
                "        results.add(literal({}));\n",
                qualify_input(&test.input, class_name)
            ));
        }
        harness.push_str(HARNESS_TAIL);
        harness
    }
}

impl Harness for JavaHarness {
    fn prepare(&self, source: &str, tests: &[TestCase]) -> Result<HarnessPlan, String> {
        let class_name = discover_class(source)
            .ok_or_else(|| "Could not find a class declaration in the submission".to_string())?;
        if class_name == HARNESS_CLASS {
            return Err(format!("Class name {} is reserved", HARNESS_CLASS));
        }

        let script = format!(
            "mkdir -p /tmp/build && javac -d /tmp/build {dir}/*.java && java -cp /tmp/build {main}",
            dir = CODE_DIR,
            main = HARNESS_CLASS
        );

        Ok(HarnessPlan {
            files: vec![
                HarnessFile {
                    name: format!("{}.java", class_name),
                    contents: source.to_string(),
                },
                HarnessFile {
                    name: format!("{}.java", HARNESS_CLASS),
                    contents: Self::generate(&class_name, tests),
                },
            ],
            command: vec!["sh".to_string(), "-c".to_string(), script],
            env: Vec::new(),
        })
    }
}
