/// Replace every `{key}` in `template` with `lookup(key)`.
/// `{{` and `}}` stand for literal braces.
pub fn expand<F>(template: &str, mut lookup: F) -> Result<String, String>
where
    F: FnMut(&str) -> Result<String, String>,
{
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;
    while let Some(i) = rest.find(['{', '}']) {
        out.push_str(&rest[..i]);
        let tail = &rest[i..];
        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
        } else if tail.starts_with('}') {
            return Err(format!("unmatched '}}' in \"{template}\""));
        } else {
            let end = tail
                .find('}')
                .ok_or_else(|| format!("unclosed '{{' in \"{template}\""))?;
            out.push_str(&lookup(&tail[1..end])?);
            rest = &tail[end + 1..];
        }
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::expand;

    fn lookup(key: &str) -> Result<String, String> {
        match key {
            "sample" => Ok("S1".to_owned()),
            "in:fastq" => Ok("/a.fq".to_owned()),
            other => Err(format!("no {other}")),
        }
    }

    #[test]
    fn test_expand() {
        assert_eq!(expand("{sample}.bam", lookup).unwrap(), "S1.bam");
        assert_eq!(expand("--in={in:fastq}", lookup).unwrap(), "--in=/a.fq");
        assert_eq!(expand("plain", lookup).unwrap(), "plain");
        assert_eq!(expand("awk '{{print}}'", lookup).unwrap(), "awk '{print}'");
    }

    #[test]
    fn test_errors() {
        assert_eq!(expand("{bam}", lookup).unwrap_err(), "no bam");
        assert!(expand("{sample", lookup).unwrap_err().contains("unclosed"));
        assert!(expand("x}", lookup).unwrap_err().contains("unmatched"));
    }
}
