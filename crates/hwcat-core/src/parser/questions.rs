//! The `<questions>` section: test results and user answers attached
//! to device nodes.

use serde::Serialize;

use crate::error::SubmissionError;
use crate::value::{decode_typed, PropertyValue};
use crate::xml::Element;

#[derive(Debug, Clone, Serialize)]
pub struct QuestionTarget {
    /// Local id of the device node the question refers to.
    pub id: i64,
    pub drivers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum Answer {
    MultipleChoice { value: String },
    Measurement { value: String, unit: Option<String> },
}

#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub name: String,
    pub plugin: Option<String>,
    pub targets: Vec<QuestionTarget>,
    pub answer: Option<Answer>,
    pub answer_choices: Vec<PropertyValue>,
    pub command: Option<String>,
    pub comment: Option<String>,
}

pub fn parse_questions(questions: &Element) -> Result<Vec<Question>, SubmissionError> {
    let mut result = Vec::with_capacity(questions.children.len());
    for question in &questions.children {
        if question.name != "question" {
            return Err(SubmissionError::Internal(format!(
                "unexpected <{}> in <questions>",
                question.name
            )));
        }
        result.push(parse_question(question)?);
    }
    Ok(result)
}

fn parse_question(question: &Element) -> Result<Question, SubmissionError> {
    let name = question
        .attr("name")
        .ok_or_else(|| SubmissionError::Internal("<question> without name".into()))?
        .to_string();
    let mut targets = Vec::new();
    let mut answer = None;
    let mut answer_choices = Vec::new();
    let mut command = None;
    let mut comment = None;

    for node in &question.children {
        match node.name.as_str() {
            "target" => targets.push(parse_target(node)?),
            "answer" => answer = Some(parse_answer(node)?),
            "answer_choices" => {
                for choice in &node.children {
                    answer_choices.push(decode_typed(choice)?);
                }
            }
            "command" => command = Some(node.trimmed_text().to_string()),
            "comment" => comment = Some(node.trimmed_text().to_string()),
            other => {
                return Err(SubmissionError::Internal(format!(
                    "unexpected question node <{other}>"
                )))
            }
        }
    }

    Ok(Question {
        name,
        plugin: question.attr("plugin").map(str::to_string),
        targets,
        answer,
        answer_choices,
        command,
        comment,
    })
}

fn parse_target(target: &Element) -> Result<QuestionTarget, SubmissionError> {
    let id = target
        .attr("id")
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| {
            SubmissionError::Internal("<target> without integer id attribute".into())
        })?;
    let drivers = target
        .children_named("driver")
        .map(|node| node.trimmed_text().to_string())
        .collect();
    Ok(QuestionTarget { id, drivers })
}

fn parse_answer(answer: &Element) -> Result<Answer, SubmissionError> {
    let value = answer.trimmed_text().to_string();
    match answer.attr("type") {
        Some("multiple_choice") => Ok(Answer::MultipleChoice { value }),
        Some("measurement") => Ok(Answer::Measurement {
            value,
            unit: answer.attr("unit").map(str::to_string),
        }),
        other => Err(SubmissionError::Internal(format!(
            "<answer> with unexpected type {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    #[test]
    fn parses_multiple_choice_question() {
        let node = parse_document(
            r#"<questions>
                 <question name="detected_network_controllers" plugin="find_network_controllers">
                   <target id="42">
                     <driver>ipw3945</driver>
                   </target>
                   <target id="43"/>
                   <command/>
                   <answer type="multiple_choice">pass</answer>
                   <answer_choices>
                     <value type="str">fail</value>
                     <value type="str">pass</value>
                     <value type="str">skip</value>
                   </answer_choices>
                   <comment>yes, the network works</comment>
                 </question>
               </questions>"#,
        )
        .unwrap();
        let questions = parse_questions(&node).unwrap();
        assert_eq!(questions.len(), 1);
        let question = &questions[0];
        assert_eq!(question.name, "detected_network_controllers");
        assert_eq!(question.plugin.as_deref(), Some("find_network_controllers"));
        assert_eq!(question.targets.len(), 2);
        assert_eq!(question.targets[0].id, 42);
        assert_eq!(question.targets[0].drivers, vec!["ipw3945"]);
        assert!(question.targets[1].drivers.is_empty());
        assert_eq!(
            question.answer,
            Some(Answer::MultipleChoice {
                value: "pass".into()
            })
        );
        assert_eq!(question.answer_choices.len(), 3);
        assert_eq!(question.comment.as_deref(), Some("yes, the network works"));
    }

    #[test]
    fn parses_measurement_question() {
        let node = parse_document(
            r#"<question name="harddisk_speed">
                 <target id="87"/>
                 <command>hdparm -t /dev/sda</command>
                 <answer type="measurement" unit="MB/sec">38.4</answer>
               </question>"#,
        )
        .unwrap();
        let question = parse_question(&node).unwrap();
        assert_eq!(
            question.answer,
            Some(Answer::Measurement {
                value: "38.4".into(),
                unit: Some("MB/sec".into()),
            })
        );
        assert_eq!(question.command.as_deref(), Some("hdparm -t /dev/sda"));
    }

    #[test]
    fn unknown_answer_type_is_rejected() {
        let node =
            parse_document(r#"<question name="q"><answer type="essay">x</answer></question>"#)
                .unwrap();
        assert!(parse_question(&node).is_err());
    }
}
