pub(crate) fn synthesis_system(dialect: &str) -> String {
    format!(
        "You are a SQL expert. Given database schema information and a question, write \
         exactly one {dialect} query that answers it.\n\n\
         Rules:\n\
         - Output only the SQL statement. No explanations, commentary or Markdown.\n\
         - Start directly with a SQL keyword such as SELECT or WITH.\n\
         - Use only tables and columns that appear in the schema.\n\
         - Use COUNT(*) for counting questions.\n\
         - Add a LIMIT when listing rows without an explicit bound.\n\n\
         Correct: SELECT COUNT(*) FROM customers\n\
         Wrong: Based on the schema, the query is: SELECT COUNT(*) FROM customers"
    )
}

pub(crate) fn synthesis_prompt(schema_context: &str, question: &str) -> String {
    format!(
        "Database schema:\n{schema_context}\n\nQuestion: {question}\n\n\
         Write the SQL query that answers this question:"
    )
}

pub(crate) const SUMMARY_SYSTEM: &str = "You are a data analyst. Given a question, the SQL \
query that was run and its results, answer the question directly, point out the key \
findings and any notable patterns, and stay concise. Use bullet points for multiple \
findings and do not repeat the raw data unless it is needed for context.";

pub(crate) fn summary_prompt(question: &str, query: &str, results: &str) -> String {
    format!(
        "Question: {question}\n\nSQL query: {query}\n\nResults:\n{results}\n\n\
         Provide insights and analysis:"
    )
}
