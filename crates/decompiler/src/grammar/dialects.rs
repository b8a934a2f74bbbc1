// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//


//! Static grammars for each supported dialect. The 3.6 grammar is the base; every other
//! dialect is the base with a diff applied.

use retrace_bytecode::Version;

use super::Grammar;
use crate::errors::GrammarError;

const BASE: &str = r#"
%generic expr_stmt
%check and or
%check ifstmt ifelsestmt iflaststmt
%check while1stmt whilestmt forstmt
%check try_except try_except_else

unit ::= stmts
unit ::= comp_body

stmts ::= stmt
stmts ::= stmts stmt
suite ::= stmts
suite_opt ::= stmts
suite_opt ::=
come_froms ::= come_froms COME_FROM
come_froms ::=

stmt ::= assign
stmt ::= aug_assign
stmt ::= ann_assign
stmt ::= setup_annotations
stmt ::= del_stmt
stmt ::= return
stmt ::= call_stmt
stmt ::= expr_stmt
stmt ::= break_stmt
stmt ::= continue_stmt
stmt ::= raise_stmt
stmt ::= assert
stmt ::= assert2
stmt ::= funcdef
stmt ::= classdef
stmt ::= import
stmt ::= import_from
stmt ::= import_star
stmt ::= ifstmt
stmt ::= ifelsestmt
stmt ::= iflaststmt
stmt ::= whilestmt
stmt ::= while1stmt
stmt ::= forstmt
stmt ::= try_except
stmt ::= try_except_else
stmt ::= tryfinallystmt
stmt ::= withstmt
stmt ::= withasstmt

assign ::= expr store
assign ::= expr DUP_TOP store store
aug_assign ::= expr expr inplace_op store
ann_assign ::= expr STORE_ANNOTATION
setup_annotations ::= SETUP_ANNOTATIONS

store ::= STORE_NAME
store ::= STORE_FAST
store ::= STORE_GLOBAL
store ::= STORE_DEREF
store ::= expr STORE_ATTR
store ::= expr expr STORE_SUBSCR
store ::= unpack

del_stmt ::= DELETE_NAME
del_stmt ::= DELETE_FAST
del_stmt ::= DELETE_GLOBAL
del_stmt ::= expr DELETE_ATTR
del_stmt ::= expr expr DELETE_SUBSCR

return ::= expr RETURN_VALUE
call_stmt ::= call POP_TOP
expr_stmt ::= expr POP_TOP
break_stmt ::= BREAK_LOOP
continue_stmt ::= CONTINUE_LOOP
funcdef ::= mkfunc store

assert ::= expr POP_JUMP_IF_TRUE LOAD_ASSERT RAISE_VARARGS_1 COME_FROM
assert2 ::= expr POP_JUMP_IF_TRUE LOAD_ASSERT expr CALL_FUNCTION_1 RAISE_VARARGS_1 COME_FROM

import ::= LOAD_CONST LOAD_CONST IMPORT_NAME store
import_from ::= LOAD_CONST LOAD_CONST IMPORT_NAME import_froms POP_TOP
import_froms ::= import_froms IMPORT_FROM store
import_froms ::= IMPORT_FROM store
import_star ::= LOAD_CONST LOAD_CONST IMPORT_NAME IMPORT_STAR

# Expressions
expr ::= LOAD_CONST
expr ::= LOAD_STR
expr ::= LOAD_NAME
expr ::= LOAD_FAST
expr ::= LOAD_GLOBAL
expr ::= LOAD_DEREF
expr ::= LOAD_CLASSDEREF
expr ::= LOAD_ASSERT
expr ::= attribute
expr ::= subscript
expr ::= binary_expr
expr ::= unary_expr
expr ::= compare
expr ::= and
expr ::= or
expr ::= listcomp
expr ::= generator_exp
expr ::= set_comp
expr ::= dict_comp
expr ::= formatted_value

attribute ::= expr LOAD_ATTR
subscript ::= expr expr BINARY_SUBSCR
binary_expr ::= expr expr binary_op
unary_expr ::= expr unary_op
compare ::= expr expr COMPARE_OP
formatted_value ::= expr FORMAT_VALUE

binary_op ::= BINARY_ADD
binary_op ::= BINARY_SUBTRACT
binary_op ::= BINARY_MULTIPLY
binary_op ::= BINARY_MATRIX_MULTIPLY
binary_op ::= BINARY_TRUE_DIVIDE
binary_op ::= BINARY_FLOOR_DIVIDE
binary_op ::= BINARY_MODULO
binary_op ::= BINARY_POWER
binary_op ::= BINARY_LSHIFT
binary_op ::= BINARY_RSHIFT
binary_op ::= BINARY_AND
binary_op ::= BINARY_OR
binary_op ::= BINARY_XOR

unary_op ::= UNARY_POSITIVE
unary_op ::= UNARY_NEGATIVE
unary_op ::= UNARY_NOT
unary_op ::= UNARY_INVERT

inplace_op ::= INPLACE_ADD
inplace_op ::= INPLACE_SUBTRACT
inplace_op ::= INPLACE_MULTIPLY
inplace_op ::= INPLACE_MATRIX_MULTIPLY
inplace_op ::= INPLACE_TRUE_DIVIDE
inplace_op ::= INPLACE_FLOOR_DIVIDE
inplace_op ::= INPLACE_MODULO
inplace_op ::= INPLACE_POWER
inplace_op ::= INPLACE_LSHIFT
inplace_op ::= INPLACE_RSHIFT
inplace_op ::= INPLACE_AND
inplace_op ::= INPLACE_OR
inplace_op ::= INPLACE_XOR

# Short-circuit operators. A jump into the span is a value-producing boolean; the
# reduce checks reject the shapes that are really nested conditionals.
and ::= expr JUMP_IF_FALSE_OR_POP expr COME_FROM
and ::= expr jmp_false expr
or ::= expr JUMP_IF_TRUE_OR_POP expr COME_FROM
or ::= and JUMP_IF_TRUE_OR_POP COME_FROM expr COME_FROM
# Inside a test the left operand of `or` jumps straight to the body.
or ::= expr jmp_true expr
or ::= and jmp_true COME_FROM expr

# Conditionals
testexpr ::= testfalse
testexpr ::= testtrue
testfalse ::= expr jmp_false
testfalse ::= or jmp_false COME_FROM
testtrue ::= expr jmp_true
jmp_false ::= POP_JUMP_IF_FALSE
jmp_true ::= POP_JUMP_IF_TRUE

ifstmt ::= testexpr suite COME_FROM
ifelsestmt ::= testexpr suite JUMP_FORWARD COME_FROM suite COME_FROM
iflaststmt ::= testexpr suite

# Loops
while1stmt ::= SETUP_LOOP suite JUMP_BACK POP_BLOCK COME_FROM_LOOP
whilestmt ::= SETUP_LOOP testexpr suite_opt JUMP_BACK COME_FROM POP_BLOCK COME_FROM_LOOP
forstmt ::= SETUP_LOOP expr GET_ITER FOR_ITER store suite_opt JUMP_BACK COME_FROM POP_BLOCK COME_FROM_LOOP

# Exceptions
try_except ::= SETUP_EXCEPT suite_opt POP_BLOCK JUMP_FORWARD COME_FROM_EXCEPT except_handlers END_FINALLY come_froms
try_except_else ::= SETUP_EXCEPT suite_opt POP_BLOCK JUMP_FORWARD COME_FROM_EXCEPT except_handlers END_FINALLY COME_FROM suite come_froms
except_handlers ::= except_handler
except_handlers ::= except_handlers except_handler
except_handler ::= except_cond suite_opt POP_EXCEPT JUMP_FORWARD COME_FROM
except_handler ::= except_bare suite_opt POP_EXCEPT JUMP_FORWARD
except_cond ::= DUP_TOP expr COMPARE_OP POP_JUMP_IF_FALSE POP_TOP POP_TOP POP_TOP
except_bare ::= POP_TOP POP_TOP POP_TOP
tryfinallystmt ::= SETUP_FINALLY suite_opt POP_BLOCK LOAD_CONST COME_FROM_FINALLY suite_opt END_FINALLY

withstmt ::= expr SETUP_WITH POP_TOP suite_opt POP_BLOCK LOAD_CONST COME_FROM_WITH with_cleanup
withasstmt ::= expr SETUP_WITH store suite_opt POP_BLOCK LOAD_CONST COME_FROM_WITH with_cleanup
with_cleanup ::= WITH_CLEANUP_START WITH_CLEANUP_FINISH END_FINALLY

# Comprehensions live in their own code units
listcomp ::= LOAD_LISTCOMP LOAD_STR MAKE_FUNCTION_0 expr GET_ITER CALL_FUNCTION_1
generator_exp ::= LOAD_GENEXPR LOAD_STR MAKE_FUNCTION_0 expr GET_ITER CALL_FUNCTION_1
set_comp ::= LOAD_SETCOMP LOAD_STR MAKE_FUNCTION_0 expr GET_ITER CALL_FUNCTION_1
dict_comp ::= LOAD_DICTCOMP LOAD_STR MAKE_FUNCTION_0 expr GET_ITER CALL_FUNCTION_1

comp_body ::= BUILD_LIST_0 LOAD_FAST FOR_ITER store comp_iter JUMP_BACK COME_FROM RETURN_VALUE
comp_body ::= BUILD_SET_0 LOAD_FAST FOR_ITER store set_iter JUMP_BACK COME_FROM RETURN_VALUE
comp_body ::= BUILD_MAP_0 LOAD_FAST FOR_ITER store dict_iter JUMP_BACK COME_FROM RETURN_VALUE
comp_body ::= LOAD_FAST FOR_ITER store gen_iter JUMP_BACK COME_FROM LOAD_CONST RETURN_VALUE
comp_iter ::= expr LIST_APPEND
comp_iter ::= expr POP_JUMP_IF_FALSE comp_iter
set_iter ::= expr SET_ADD
set_iter ::= expr POP_JUMP_IF_FALSE set_iter
dict_iter ::= expr expr MAP_ADD
dict_iter ::= expr POP_JUMP_IF_FALSE dict_iter
gen_iter ::= expr YIELD_VALUE POP_TOP
gen_iter ::= expr POP_JUMP_IF_FALSE gen_iter
"#;

/// 2.7: no `POP_EXCEPT`, a single `WITH_CLEANUP`, print statements, inline list
/// comprehensions and code objects without qualified names.
const PY27: &str = r#"
-stmt ::= ann_assign
-stmt ::= setup_annotations
-ann_assign ::= expr STORE_ANNOTATION
-setup_annotations ::= SETUP_ANNOTATIONS

-except_handler ::= except_cond suite_opt POP_EXCEPT JUMP_FORWARD COME_FROM
-except_handler ::= except_bare suite_opt POP_EXCEPT JUMP_FORWARD
except_handler ::= except_cond suite_opt JUMP_FORWARD COME_FROM
except_handler ::= except_bare suite_opt JUMP_FORWARD
except_cond ::= DUP_TOP expr COMPARE_OP POP_JUMP_IF_FALSE POP_TOP store POP_TOP

-with_cleanup ::= WITH_CLEANUP_START WITH_CLEANUP_FINISH END_FINALLY
with_cleanup ::= WITH_CLEANUP END_FINALLY

-assert2 ::= expr POP_JUMP_IF_TRUE LOAD_ASSERT expr CALL_FUNCTION_1 RAISE_VARARGS_1 COME_FROM
assert2 ::= expr POP_JUMP_IF_TRUE LOAD_ASSERT expr RAISE_VARARGS_2 COME_FROM

stmt ::= print_item
stmt ::= print_nl
stmt ::= print_items_to
stmt ::= print_nl_to
print_item ::= expr PRINT_ITEM
print_nl ::= PRINT_NEWLINE
print_items_to ::= expr print_to_items PRINT_NEWLINE_TO
print_items_to ::= expr print_to_items POP_TOP
print_to_items ::= print_to_items print_to_item
print_to_items ::= print_to_item
print_to_item ::= DUP_TOP expr ROT_TWO PRINT_ITEM_TO
print_nl_to ::= expr PRINT_NEWLINE_TO

expr ::= slice0
expr ::= slice1
expr ::= slice2
expr ::= slice3
slice0 ::= expr SLICE+0
slice1 ::= expr expr SLICE+1
slice2 ::= expr expr SLICE+2
slice3 ::= expr expr expr SLICE+3
store ::= expr STORE_SLICE+0
store ::= expr expr STORE_SLICE+1
store ::= expr expr STORE_SLICE+2
store ::= expr expr expr STORE_SLICE+3
del_stmt ::= expr DELETE_SLICE+0
del_stmt ::= expr expr DELETE_SLICE+1
del_stmt ::= expr expr DELETE_SLICE+2
del_stmt ::= expr expr expr DELETE_SLICE+3

binary_op ::= BINARY_DIVIDE
inplace_op ::= INPLACE_DIVIDE
unary_op ::= UNARY_CONVERT
expr ::= LOAD_LOCALS
-expr ::= LOAD_CLASSDEREF
-expr ::= formatted_value
-formatted_value ::= expr FORMAT_VALUE

-listcomp ::= LOAD_LISTCOMP LOAD_STR MAKE_FUNCTION_0 expr GET_ITER CALL_FUNCTION_1
-generator_exp ::= LOAD_GENEXPR LOAD_STR MAKE_FUNCTION_0 expr GET_ITER CALL_FUNCTION_1
-set_comp ::= LOAD_SETCOMP LOAD_STR MAKE_FUNCTION_0 expr GET_ITER CALL_FUNCTION_1
-dict_comp ::= LOAD_DICTCOMP LOAD_STR MAKE_FUNCTION_0 expr GET_ITER CALL_FUNCTION_1
-comp_body ::= BUILD_LIST_0 LOAD_FAST FOR_ITER store comp_iter JUMP_BACK COME_FROM RETURN_VALUE
listcomp ::= BUILD_LIST_0 expr GET_ITER FOR_ITER store comp_iter JUMP_BACK COME_FROM
generator_exp ::= LOAD_GENEXPR MAKE_FUNCTION_0 expr GET_ITER CALL_FUNCTION_1
set_comp ::= LOAD_SETCOMP MAKE_FUNCTION_0 expr GET_ITER CALL_FUNCTION_1
dict_comp ::= LOAD_DICTCOMP MAKE_FUNCTION_0 expr GET_ITER CALL_FUNCTION_1

kwarg ::= LOAD_STR expr
kv ::= expr expr STORE_MAP
classdef ::= LOAD_STR expr mkfunc CALL_FUNCTION_0 BUILD_CLASS store
"#;

/// 3.7: annotations are compiled to plain stores, method calls get their own opcodes.
const PY37: &str = r#"
-stmt ::= ann_assign
-ann_assign ::= expr STORE_ANNOTATION
call_stmt ::= call_method POP_TOP
"#;

/// The 3.6 grammar every other dialect is derived from.
pub fn base_grammar() -> Result<Grammar, GrammarError> {
    Grammar::from_text(BASE)
}

pub fn dialect_grammar(version: Version) -> Result<Grammar, GrammarError> {
    let base = base_grammar()?;
    match version {
        Version::V2_7 => base.merged(PY27),
        Version::V3_6 => Ok(base),
        Version::V3_7 => base.merged(PY37),
    }
}
